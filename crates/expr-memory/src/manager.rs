use std::sync::Arc;

use expr_core::{Message, Role};

use crate::audit::AuditLog;
use crate::cache::SessionCache;
use crate::store::SummaryStore;
use crate::summarizer::{clip_summary, SummaryInput, Summarizer};
use crate::types::{AuditEntry, SessionRecord};

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_summary_chars: usize,
    /// Prior user/assistant messages included in the summarization request.
    pub recent_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_summary_chars: 1000,
            recent_messages: 12,
        }
    }
}

/// Owns the three summary layers and the summarizer.
///
/// All operations are best-effort: failures are logged and never reach the caller.
pub struct SessionMemoryManager {
    cache: SessionCache,
    store: Arc<dyn SummaryStore>,
    audit: Arc<dyn AuditLog>,
    summarizer: Arc<dyn Summarizer>,
    config: MemoryConfig,
}

impl SessionMemoryManager {
    pub fn new(
        store: Arc<dyn SummaryStore>,
        audit: Arc<dyn AuditLog>,
        summarizer: Arc<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            cache: SessionCache::new(),
            store,
            audit,
            summarizer,
            config,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Current summary for `session_id`, or an empty string.
    pub async fn lookup(&self, session_id: &str) -> String {
        if let Some(record) = self.cache.get(session_id) {
            return record.summary;
        }

        match self.store.get(session_id).await {
            Ok(Some(record)) => {
                let summary = record.summary.clone();
                self.cache.put(record);
                summary
            }
            Ok(None) => String::new(),
            Err(error) => {
                log::warn!("[{}] Summary lookup failed: {}", session_id, error);
                String::new()
            }
        }
    }

    /// Summarizes a finished exchange and writes the result to every layer.
    ///
    /// `history` is the conversation that preceded `prompt`.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        prior_summary: &str,
        history: &[Message],
        prompt: &str,
        reply: &str,
    ) {
        let dialogue: Vec<Message> = history.iter().filter(|m| m.is_dialogue()).cloned().collect();
        let start = dialogue.len().saturating_sub(self.config.recent_messages);

        let input = SummaryInput {
            prior_summary,
            recent: &dialogue[start..],
            prompt,
            reply,
            max_chars: self.config.max_summary_chars,
        };

        match self.summarizer.summarize(input).await {
            Ok(summary) => {
                let summary = clip_summary(&summary, self.config.max_summary_chars);
                if summary.is_empty() {
                    log::warn!("[{}] Summarizer returned nothing; keeping previous summary", session_id);
                } else {
                    self.store_summary(SessionRecord::new(session_id, summary)).await;
                }
            }
            Err(error) => log::warn!("[{}] Summarization failed: {}", session_id, error),
        }

        let entries = vec![
            AuditEntry::new(session_id, Role::User, prompt),
            AuditEntry::new(session_id, Role::Assistant, reply),
        ];
        if let Err(error) = self.audit.append(entries).await {
            log::warn!("[{}] Audit append failed: {}", session_id, error);
        }
    }

    async fn store_summary(&self, record: SessionRecord) {
        let session_id = record.session_id.clone();
        self.cache.put(record.clone());

        match self.store.put(&record).await {
            Ok(()) => log::debug!(
                "[{}] Summary stored ({} chars)",
                session_id,
                record.summary.chars().count()
            ),
            Err(error) => log::warn!("[{}] Summary persist failed: {}", session_id, error),
        }
    }
}
