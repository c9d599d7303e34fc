use dashmap::DashMap;

use crate::types::SessionRecord;

/// Process-wide summary cache shared by all requests. Last write wins.
#[derive(Debug, Default)]
pub struct SessionCache {
    records: DashMap<String, SessionRecord>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn put(&self, record: SessionRecord) {
        self.records.insert(record.session_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
