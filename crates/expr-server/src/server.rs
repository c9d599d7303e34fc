use std::io;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use crate::handlers;
use crate::state::{AppState, ServerConfig};

/// Routes shared by the binary and integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::health::handler))
        .route("/health", web::get().to(handlers::health::handler))
        .route("/api/chat", web::get().to(handlers::chat::handler));
}

pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    let state = web::Data::new(AppState::from_config(&config).await?);

    log::info!("Listening on 0.0.0.0:{}", config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(configure)
    })
    .bind(format!("0.0.0.0:{}", config.port))?
    .run()
    .await
}
