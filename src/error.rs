// src/error.rs
//! Pipeline error taxonomy.
//!
//! Only `AuthRequired` and `PersistFailure` ever reach a caller of
//! `process_all`; `FetchFailure` and `InvalidItem` are recovered inside the
//! pass (skip the list, drop the item) and only show up in logs/metrics.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upstream source never authenticated (or authentication failed).
    #[error("not authenticated with the upstream source")]
    AuthRequired,

    #[error("fetch failed for list {list_id}: {reason}")]
    FetchFailure { list_id: String, reason: String },

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("failed to persist {}: {reason}", path.display())]
    PersistFailure { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn persist(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::PersistFailure {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Short message for end users (HTTP bodies, CLI output). Internal
    /// detail stays in the `Display` impl and the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Feed updates are unavailable: the source account is not logged in.",
            Self::FetchFailure { .. } => "Could not fetch one of the monitored lists.",
            Self::InvalidItem(_) => "An item from the source could not be read.",
            Self::PersistFailure { .. } => "The feed could not be saved. Please try again later.",
        }
    }
}
