// src/ingest/aggregator.rs
//! Owns the pass: fetch -> normalize -> filter -> dedup -> sort/cap ->
//! (thread expansion) -> render -> persist.
//!
//! State machine: `Idle -> Authenticating -> Ready | Disabled`, and
//! `Ready -> RunningPass -> Ready` for every pass. The dedup store lives
//! behind an async mutex that doubles as the pass lock, so two passes never
//! overlap no matter which front end triggered them.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::PipelineError;
use crate::feed;
use crate::feed::store::{FeedFileInfo, FeedStore};
use crate::ingest::dedup::DedupStore;
use crate::ingest::filter::should_keep;
use crate::ingest::normalize::normalize;
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{Item, ListSource, RawItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceState {
    Idle,
    Authenticating,
    Ready,
    RunningPass,
    Disabled,
}

/// Result of one successful pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassOutcome {
    pub count: usize,
    pub location: PathBuf,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PassStats {
    pub fetched: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub accepted: usize,
    pub published: usize,
    pub lists_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: PassStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringInfo {
    pub list_count: usize,
    pub lists: Vec<String>,
    pub interval_minutes: u64,
    pub max_per_list: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub state: ServiceState,
    pub feed_file_info: FeedFileInfo,
    pub monitoring: MonitoringInfo,
    /// Seconds since the aggregator was constructed.
    pub uptime: u64,
    pub last_pass: Option<PassSummary>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct PassLog {
    last_pass: Option<PassSummary>,
    last_error: Option<String>,
}

pub struct Aggregator {
    cfg: Arc<Config>,
    source: Arc<dyn ListSource>,
    feed_store: FeedStore,
    dedup: Mutex<DedupStore>,
    state: RwLock<ServiceState>,
    log: RwLock<PassLog>,
    started_at: Instant,
}

impl Aggregator {
    pub fn new(cfg: Arc<Config>, source: Arc<dyn ListSource>) -> Self {
        ensure_metrics_described();
        Self {
            feed_store: FeedStore::in_dir(&cfg.output_dir),
            dedup: Mutex::new(DedupStore::in_dir(&cfg.output_dir)),
            cfg,
            source,
            state: RwLock::new(ServiceState::Idle),
            log: RwLock::new(PassLog::default()),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn feed_store(&self) -> &FeedStore {
        &self.feed_store
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ServiceState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *guard != next {
            tracing::debug!(from = ?*guard, to = ?next, "state transition");
            *guard = next;
        }
    }

    /// Hydrate the dedup store, then authenticate with the source.
    /// Calling it again from `Disabled` retries authentication.
    pub async fn start(&self) -> ServiceState {
        match self.state() {
            ServiceState::Ready | ServiceState::RunningPass | ServiceState::Authenticating => {
                return self.state()
            }
            ServiceState::Idle => {
                self.dedup.lock().await.load().await;
            }
            ServiceState::Disabled => {}
        }

        self.set_state(ServiceState::Authenticating);
        let auth = tokio::time::timeout(self.cfg.fetch_timeout(), self.source.authenticate()).await;
        match auth {
            Ok(Ok(())) => {
                tracing::info!(provider = self.source.name(), lists = self.cfg.list_ids.len(), "source authenticated; ready");
                self.set_state(ServiceState::Ready);
            }
            Ok(Err(e)) => {
                tracing::error!(provider = self.source.name(), error = %format!("{e:#}"), "authentication failed; feed updates disabled");
                self.set_state(ServiceState::Disabled);
            }
            Err(_) => {
                tracing::error!(provider = self.source.name(), "authentication timed out; feed updates disabled");
                self.set_state(ServiceState::Disabled);
            }
        }
        self.state()
    }

    fn ensure_ready(&self) -> Result<(), PipelineError> {
        match self.state() {
            ServiceState::Ready | ServiceState::RunningPass => Ok(()),
            _ => Err(PipelineError::AuthRequired),
        }
    }

    /// Run one pass, waiting for an in-flight pass to finish first.
    pub async fn process_all(&self) -> Result<PassOutcome, PipelineError> {
        self.ensure_ready()?;
        let mut dedup = self.dedup.lock().await;
        self.run_pass(&mut dedup).await
    }

    /// Like `process_all`, but returns `None` instead of waiting when a
    /// pass is already running. Used by the timer.
    pub async fn process_all_if_idle(&self) -> Option<Result<PassOutcome, PipelineError>> {
        if let Err(e) = self.ensure_ready() {
            return Some(Err(e));
        }
        let Ok(mut dedup) = self.dedup.try_lock() else {
            tracing::debug!("pass already in flight; skipping tick");
            return None;
        };
        Some(self.run_pass(&mut dedup).await)
    }

    async fn run_pass(&self, dedup: &mut DedupStore) -> Result<PassOutcome, PipelineError> {
        self.set_state(ServiceState::RunningPass);
        let result = self.pass(dedup).await;
        self.set_state(ServiceState::Ready);

        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok((_, stats)) => {
                log.last_pass = Some(PassSummary {
                    finished_at: Utc::now(),
                    stats: stats.clone(),
                });
                log.last_error = None;
            }
            Err(e) => log.last_error = Some(e.to_string()),
        }
        result.map(|(outcome, _)| outcome)
    }

    async fn pass(&self, dedup: &mut DedupStore) -> Result<(PassOutcome, PassStats), PipelineError> {
        let t0 = Instant::now();
        let now = Utc::now();
        let filter = self.cfg.filter();
        let mut stats = PassStats::default();

        let mut seen_this_pass: HashSet<String> = HashSet::new();
        let mut accepted_ids: Vec<String> = Vec::new();
        let mut fresh: Vec<Item> = Vec::new();

        for (i, list_id) in self.cfg.list_ids.iter().enumerate() {
            if i > 0 && !self.cfg.list_delay().is_zero() {
                tokio::time::sleep(self.cfg.list_delay()).await;
            }

            let raws = match self.fetch_list(list_id).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(list_id = %list_id, error = %e, "list fetch failed; skipping list");
                    counter!("ingest_list_errors_total").increment(1);
                    stats.lists_failed += 1;
                    continue;
                }
            };

            let fetched = raws.len();
            let mut kept = 0usize;
            for raw in raws {
                let item = match normalize(raw, now) {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::debug!(list_id = %list_id, error = %e, "dropping item");
                        stats.invalid += 1;
                        continue;
                    }
                };
                if !should_keep(&item, &filter) {
                    stats.filtered += 1;
                    continue;
                }
                if dedup.has(&item.id) || !seen_this_pass.insert(item.id.clone()) {
                    stats.duplicates += 1;
                    continue;
                }
                accepted_ids.push(item.id.clone());
                fresh.push(item);
                kept += 1;
            }
            stats.fetched += fetched;
            tracing::info!(list_id = %list_id, fetched, kept, "list processed");
        }

        stats.accepted = fresh.len();
        // Stable: equal timestamps keep input order.
        fresh.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        fresh.truncate(self.cfg.max_feed_entries);

        if self.cfg.expand_threads {
            for item in fresh.iter_mut() {
                self.expand_thread(item, now).await;
            }
        }

        let location = if fresh.is_empty() && self.feed_store.exists().await {
            tracing::info!("no new items; keeping previous feed document");
            self.feed_store.path().to_path_buf()
        } else {
            let doc = feed::build(&fresh, &self.cfg.feed_meta(), now);
            let xml = doc
                .to_xml()
                .map_err(|e| PipelineError::persist(self.feed_store.path(), format!("{e:#}")))?;
            self.feed_store.save(&xml).await?
        };

        // Only after the document is on disk, so a failed write retries these items.
        let mut added = 0usize;
        for id in &accepted_ids {
            if dedup.add(id) {
                added += 1;
            }
        }
        if added > 0 {
            dedup.save_logged().await;
        }

        stats.published = fresh.len();
        stats.duration_ms = t0.elapsed().as_millis() as u64;

        counter!("ingest_items_fetched_total").increment(stats.fetched as u64);
        counter!("ingest_items_kept_total").increment(stats.published as u64);
        counter!("ingest_items_filtered_total").increment(stats.filtered as u64);
        counter!("ingest_items_dedup_total").increment(stats.duplicates as u64);
        counter!("ingest_invalid_items_total").increment(stats.invalid as u64);
        histogram!("ingest_pass_duration_ms").record(stats.duration_ms as f64);
        gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);
        if !fresh.is_empty() {
            gauge!("feed_entries").set(fresh.len() as f64);
        }

        tracing::info!(
            target: "ingest",
            published = stats.published,
            filtered = stats.filtered,
            dedup = stats.duplicates,
            invalid = stats.invalid,
            lists_failed = stats.lists_failed,
            ms = stats.duration_ms,
            "pass complete"
        );

        Ok((
            PassOutcome {
                count: stats.published,
                location,
                timestamp: now,
            },
            stats,
        ))
    }

    async fn fetch_list(&self, list_id: &str) -> Result<Vec<RawItem>, PipelineError> {
        let fut = self
            .source
            .fetch_list_items(list_id, self.cfg.max_items_per_list);
        match tokio::time::timeout(self.cfg.fetch_timeout(), fut).await {
            Ok(Ok(mut items)) => {
                items.truncate(self.cfg.max_items_per_list);
                Ok(items)
            }
            Ok(Err(e)) => Err(PipelineError::FetchFailure {
                list_id: list_id.to_string(),
                reason: format!("{e:#}"),
            }),
            Err(_) => Err(PipelineError::FetchFailure {
                list_id: list_id.to_string(),
                reason: format!("timed out after {}s", self.cfg.fetch_timeout_secs),
            }),
        }
    }

    /// Attach the reply chain; on any failure the item goes out without one.
    async fn expand_thread(&self, item: &mut Item, now: DateTime<Utc>) {
        let detail = tokio::time::timeout(
            self.cfg.fetch_timeout(),
            self.source.fetch_item_detail(&item.id),
        )
        .await;
        let raw = match detail {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(id = %item.id, error = %format!("{e:#}"), "thread expansion failed");
                return;
            }
            Err(_) => {
                tracing::warn!(id = %item.id, "thread expansion timed out");
                return;
            }
        };
        match normalize(raw, now) {
            Ok(detail) => {
                let thread: Vec<Item> = detail
                    .thread
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|node| node.id != item.id)
                    .collect();
                if !thread.is_empty() {
                    item.thread = Some(thread);
                }
            }
            Err(e) => tracing::warn!(id = %item.id, error = %e, "thread detail unusable"),
        }
    }

    /// Latest persisted document, `None` before the first pass.
    pub async fn feed_document(&self) -> std::io::Result<Option<String>> {
        self.feed_store.load_raw().await
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state();
        let (last_pass, last_error) = {
            let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
            (log.last_pass.clone(), log.last_error.clone())
        };
        StatusSnapshot {
            running: matches!(state, ServiceState::Ready | ServiceState::RunningPass),
            state,
            feed_file_info: self.feed_store.file_info().await,
            monitoring: MonitoringInfo {
                list_count: self.cfg.list_ids.len(),
                lists: self.cfg.list_ids.clone(),
                interval_minutes: self.cfg.update_interval_minutes,
                max_per_list: self.cfg.max_items_per_list,
            },
            uptime: self.started_at.elapsed().as_secs(),
            last_pass,
            last_error,
        }
    }

    /// Flush the dedup snapshot. Waits for an in-flight pass.
    pub async fn shutdown(&self) {
        let dedup = self.dedup.lock().await;
        dedup.save_logged().await;
        tracing::info!(ids = dedup.len(), "dedup store flushed");
    }
}
