//! In-memory tool executor for exercising the agent loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ToolError, ToolExecutor, ToolResult, ToolSchema};

#[derive(Debug, Clone)]
enum Behavior {
    Reply(String),
    Fail(ToolError),
    Hang,
}

/// Records every call and answers from a per-tool script.
#[derive(Default)]
pub struct MockToolExecutor {
    catalog: Vec<ToolSchema>,
    catalog_error: Option<ToolError>,
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<(String, Value)>>,
    closes: AtomicUsize,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, reply: &str) -> Self {
        self.catalog.push(ToolSchema::function(
            name,
            format!("{name} tool"),
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        self.behaviors
            .insert(name.to_string(), Behavior::Reply(reply.to_string()));
        self
    }

    pub fn with_failing_tool(mut self, name: &str, error: ToolError) -> Self {
        self = self.with_tool(name, "");
        self.behaviors.insert(name.to_string(), Behavior::Fail(error));
        self
    }

    pub fn with_hanging_tool(mut self, name: &str) -> Self {
        self = self.with_tool(name, "");
        self.behaviors.insert(name.to_string(), Behavior::Hang);
        self
    }

    pub fn with_catalog_error(mut self, error: ToolError) -> Self {
        self.catalog_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn list_tools(&self) -> Result<Vec<ToolSchema>, ToolError> {
        match &self.catalog_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.catalog.clone()),
        }
    }

    async fn execute(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), args));

        match self.behaviors.get(name).cloned() {
            Some(Behavior::Reply(text)) => Ok(ToolResult::ok(text)),
            Some(Behavior::Fail(error)) => Err(error),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ToolError::Unavailable("hung".to_string()))
            }
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
