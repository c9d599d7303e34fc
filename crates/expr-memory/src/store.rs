use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::MemoryResult;
use crate::types::SessionRecord;

/// Durable key/value store for session summaries.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get(&self, session_id: &str) -> MemoryResult<Option<SessionRecord>>;
    async fn put(&self, record: &SessionRecord) -> MemoryResult<()>;
}

/// One JSON document per session under `base_path`.
#[derive(Debug, Clone)]
pub struct JsonFileSummaryStore {
    base_path: PathBuf,
}

impl JsonFileSummaryStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", file_key(session_id)))
    }
}

/// Session ids come from callers; anything outside `[A-Za-z0-9_-]` is
/// percent-encoded so ids map to distinct, traversal-free file names.
fn file_key(session_id: &str) -> String {
    let mut key = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            key.push(byte as char);
        } else {
            key.push_str(&format!("%{:02X}", byte));
        }
    }
    key
}

#[async_trait]
impl SummaryStore for JsonFileSummaryStore {
    async fn get(&self, session_id: &str) -> MemoryResult<Option<SessionRecord>> {
        let path = self.record_path(session_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn put(&self, record: &SessionRecord) -> MemoryResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let path = self.record_path(&record.session_id);
        // Each writer stages its own file; the last rename wins.
        let tmp_path = self.base_path.join(format!(
            "{}.{}.tmp",
            file_key(&record.session_id),
            Uuid::new_v4().simple()
        ));

        fs::write(&tmp_path, serde_json::to_vec(record)?).await?;
        if let Err(error) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(error.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempdir().expect("temp dir");
        let store = JsonFileSummaryStore::new(dir.path().join("summaries"));
        store.init().await.expect("init");

        assert_eq!(store.get("s1").await.unwrap(), None);

        let record = SessionRecord::new("s1", "User asked about Ahri.");
        store.put(&record).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn put_overwrites_previous_summary() {
        let dir = tempdir().expect("temp dir");
        let store = JsonFileSummaryStore::new(dir.path());

        store.put(&SessionRecord::new("s1", "old")).await.unwrap();
        store.put(&SessionRecord::new("s1", "new")).await.unwrap();

        assert_eq!(store.get("s1").await.unwrap().unwrap().summary, "new");
    }

    #[tokio::test]
    async fn concurrent_puts_for_one_session_both_land() {
        let dir = tempdir().expect("temp dir");
        let store = JsonFileSummaryStore::new(dir.path());
        store.init().await.expect("init");

        let first = SessionRecord::new("s1", "first");
        let second = SessionRecord::new("s1", "second");
        let (a, b) = tokio::join!(store.put(&first), store.put(&second));
        a.unwrap();
        b.unwrap();

        let stored = store.get("s1").await.unwrap().unwrap().summary;
        assert!(stored == "first" || stored == "second", "{stored}");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn hostile_ids_stay_inside_base_path() {
        let dir = tempdir().expect("temp dir");
        let base = dir.path().join("summaries");
        let store = JsonFileSummaryStore::new(&base);

        store.put(&SessionRecord::new("../escape", "x")).await.unwrap();
        store.put(&SessionRecord::new("..%2Fescape", "y")).await.unwrap();

        assert!(!dir.path().join("escape.json").exists());
        assert_eq!(store.get("../escape").await.unwrap().unwrap().summary, "x");
        assert_eq!(store.get("..%2Fescape").await.unwrap().unwrap().summary, "y");
    }

    #[test]
    fn file_key_is_injective_on_reserved_bytes() {
        assert_eq!(file_key("abc-123_X"), "abc-123_X");
        assert_eq!(file_key("a/b"), "a%2Fb");
        assert_ne!(file_key("a/b"), file_key("a%2Fb"));
    }
}
