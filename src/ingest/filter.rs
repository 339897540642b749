// src/ingest/filter.rs
use crate::ingest::types::Item;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    pub exclude_reposts: bool,
    pub exclude_replies: bool,
    /// Minimum body length in characters.
    pub min_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_reposts: false,
            exclude_replies: false,
            min_length: 10,
        }
    }
}

/// Independent predicates; the order only decides which one short-circuits.
pub fn should_keep(item: &Item, cfg: &FilterConfig) -> bool {
    if cfg.exclude_reposts && item.is_repost {
        return false;
    }
    if cfg.exclude_replies && item.is_reply {
        return false;
    }
    item.text.chars().count() >= cfg.min_length
}
