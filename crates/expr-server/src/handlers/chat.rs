use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use expr_core::OutboundFrame;
use expr_loop::{run_exchange, ExchangeRequest, FrameEmitter};

use crate::state::{spawn_sse_sender, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub prompt: Option<String>,
    /// JSON array of `{sender, text}`.
    pub history: Option<String>,
    pub session_id: Option<String>,
}

/// `GET /api/chat`: runs one exchange and streams its frames as SSE.
///
/// The response is always 200; failures surface as frames.
pub async fn handler(state: web::Data<AppState>, query: web::Query<ChatQuery>) -> impl Responder {
    let ChatQuery {
        prompt,
        history,
        session_id,
    } = query.into_inner();
    let session_id = session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    let log_id = session_id.clone().unwrap_or_else(|| "anonymous".to_string());
    log::info!("[{}] Chat request received", log_id);

    let (sse_tx, mut sse_rx) = mpsc::channel::<bytes::Bytes>(100);
    let (frame_tx, frame_rx) = mpsc::channel::<OutboundFrame>(100);
    let cancel_token = CancellationToken::new();

    let _sse_handle = spawn_sse_sender(frame_rx, sse_tx, cancel_token.clone());

    let state = state.into_inner();
    tokio::spawn(async move {
        let has_prompt = prompt
            .as_deref()
            .is_some_and(|prompt| !prompt.trim().is_empty());
        let context_summary = match (&session_id, has_prompt) {
            (Some(id), true) => state.memory.lookup(id).await,
            _ => String::new(),
        };

        let request = ExchangeRequest {
            session_id: session_id.clone(),
            prompt,
            history_json: history,
            context_summary: context_summary.clone(),
        };

        let tools = (state.tools_factory)();
        let emitter = FrameEmitter::new(frame_tx, cancel_token.clone());
        let report = run_exchange(
            request,
            state.llm.as_ref(),
            tools.as_ref(),
            emitter,
            cancel_token,
            &state.loop_config,
        )
        .await;

        let Some(session_id) = session_id else {
            return;
        };
        if !report.status.should_record() {
            log::debug!("[{}] Skipping memory update ({:?})", session_id, report.status);
            return;
        }

        state
            .memory
            .record_exchange(
                &session_id,
                &context_summary,
                &report.prior_history,
                &report.prompt,
                &report.reply,
            )
            .await;
    });

    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"))
        .streaming(async_stream::stream! {
            while let Some(item) = sse_rx.recv().await {
                yield Ok::<_, actix_web::Error>(item);
            }
        })
}
