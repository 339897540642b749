// src/ingest/dedup.rs
//! Persisted set of identifiers already published.
//!
//! The set only grows: there is no eviction or TTL, so memory and the
//! snapshot file scale with every id ever emitted by this deployment.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::storage::write_atomic;

pub const DEDUP_FILE_NAME: &str = "processed_ids.json";

#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    seen: HashSet<String>,
    // Insertion order for the snapshot.
    order: Vec<String>,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: HashSet::new(),
            order: Vec::new(),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEDUP_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns true when `id` was not present before.
    pub fn add(&mut self, id: &str) -> bool {
        if self.seen.insert(id.to_string()) {
            self.order.push(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Best-effort hydrate from the snapshot; any read or parse failure
    /// leaves the set empty. Returns the number of ids loaded.
    pub async fn load(&mut self) -> usize {
        let ids: Vec<String> = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "dedup snapshot unreadable; starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "dedup snapshot read failed; starting empty");
                Vec::new()
            }
        };
        self.seen.clear();
        self.order.clear();
        for id in ids {
            self.add(&id);
        }
        tracing::info!(count = self.len(), "dedup store loaded");
        self.len()
    }

    /// Write the full snapshot. Callers that cannot act on the failure use
    /// [`DedupStore::save_logged`].
    pub async fn save(&self) -> Result<(), PipelineError> {
        let body = serde_json::to_vec(&self.order).map_err(|e| PipelineError::persist(&self.path, e))?;
        write_atomic(&self.path, &body)
            .await
            .map_err(|e| PipelineError::persist(&self.path, e))
    }

    pub async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "dedup snapshot not saved; items may be re-emitted after restart");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_has() {
        let mut store = DedupStore::new("unused.json");
        assert!(!store.has("a"));
        assert!(store.add("a"));
        assert!(!store.add("a"));
        assert!(store.has("a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::in_dir(dir.path());
        for id in ["3", "1", "2"] {
            store.add(id);
        }
        store.save().await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"["3","1","2"]"#);

        let mut fresh = DedupStore::in_dir(dir.path());
        assert_eq!(fresh.load().await, 3);
        assert!(fresh.has("1") && fresh.has("2") && fresh.has("3"));
    }

    #[tokio::test]
    async fn load_tolerates_missing_and_corrupt_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::in_dir(dir.path());
        assert_eq!(store.load().await, 0);

        std::fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load().await, 0);
        assert!(store.is_empty());
    }
}
