// tests/common/mod.rs
// Shared mock source + config for integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use listfeed::config::Config;
use listfeed::ingest::types::{ListSource, RawId, RawItem, RawTimestamp};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub enum ListBehavior {
    Items(Vec<RawItem>),
    Fail(&'static str),
    Slow(Duration, Vec<RawItem>),
}

pub struct MockSource {
    pub auth_ok: bool,
    pub lists: HashMap<String, ListBehavior>,
    pub details: HashMap<String, RawItem>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            auth_ok: true,
            lists: HashMap::new(),
            details: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            auth_ok: false,
            ..Self::new()
        }
    }

    pub fn with_list(mut self, id: &str, behavior: ListBehavior) -> Self {
        self.lists.insert(id.to_string(), behavior);
        self
    }

    pub fn with_detail(mut self, id: &str, raw: RawItem) -> Self {
        self.details.insert(id.to_string(), raw);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListSource for MockSource {
    async fn authenticate(&self) -> Result<()> {
        if self.auth_ok {
            Ok(())
        } else {
            Err(anyhow!("login rejected"))
        }
    }

    async fn fetch_list_items(&self, list_id: &str, max: usize) -> Result<Vec<RawItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.lists.get(list_id) {
            Some(ListBehavior::Items(v)) => Ok(v.iter().take(max).cloned().collect()),
            Some(ListBehavior::Fail(msg)) => Err(anyhow!(*msg)),
            Some(ListBehavior::Slow(d, v)) => {
                tokio::time::sleep(*d).await;
                Ok(v.iter().take(max).cloned().collect())
            }
            None => Err(anyhow!("unknown list {list_id}")),
        }
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<RawItem> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no detail for {id}"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// A post with a body long enough to pass the default length filter.
pub fn raw(id: &str, handle: &str, ts: i64) -> RawItem {
    RawItem {
        id: Some(RawId::Text(id.to_string())),
        text: Some(format!("post number {id} from {handle}")),
        username: Some(handle.to_string()),
        timestamp: Some(RawTimestamp::Integer(ts)),
        ..Default::default()
    }
}

pub fn test_config(dir: &Path, lists: &[&str]) -> Config {
    Config {
        list_ids: lists.iter().map(|s| s.to_string()).collect(),
        output_dir: dir.to_path_buf(),
        list_delay_ms: 0,
        fetch_timeout_secs: 1,
        warmup_secs: 0,
        ..Config::default()
    }
}
