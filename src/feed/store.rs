// src/feed/store.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::storage::write_atomic;

pub const FEED_FILE_NAME: &str = "feed.xml";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedFileInfo {
    pub exists: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// Single-slot store: each save replaces the previous document.
#[derive(Debug, Clone)]
pub struct FeedStore {
    path: PathBuf,
}

impl FeedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(FEED_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, xml: &str) -> Result<PathBuf, PipelineError> {
        write_atomic(&self.path, xml.as_bytes())
            .await
            .map_err(|e| PipelineError::persist(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), bytes = xml.len(), "feed document saved");
        Ok(self.path.clone())
    }

    /// `Ok(None)` when no document has been generated yet.
    pub async fn load_raw(&self) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn file_info(&self) -> FeedFileInfo {
        match tokio::fs::metadata(&self.path).await {
            Ok(m) => FeedFileInfo {
                exists: true,
                last_modified: m.modified().ok().map(DateTime::<Utc>::from),
                size: Some(m.len()),
            },
            Err(_) => FeedFileInfo::default(),
        }
    }
}
