// src/ingest/mod.rs
pub mod aggregator;
pub mod dedup;
pub mod filter;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::config::{Config, SourceMode};
use crate::ingest::providers::{fixture::FixtureSource, http_bridge::HttpBridgeSource};
use crate::ingest::types::ListSource;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_fetched_total", "Raw items returned by list fetches.");
        describe_counter!(
            "ingest_items_kept_total",
            "Items published into the feed document."
        );
        describe_counter!(
            "ingest_items_filtered_total",
            "Items dropped by the repost/reply/length filters."
        );
        describe_counter!(
            "ingest_items_dedup_total",
            "Items dropped because their id was already published."
        );
        describe_counter!(
            "ingest_invalid_items_total",
            "Items (or thread nodes) dropped during decoding/normalization."
        );
        describe_counter!("ingest_list_errors_total", "List fetches that failed or timed out.");
        describe_counter!(
            "ingest_provider_errors_total",
            "HTTP-level errors from the source bridge."
        );
        describe_counter!("ingest_runs_total", "Scheduler-triggered passes.");
        describe_histogram!("ingest_pass_duration_ms", "Pass duration in milliseconds.");
        describe_histogram!("ingest_fetch_ms", "Bridge request duration in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last completed a pass."
        );
        describe_gauge!("feed_entries", "Entries in the latest written feed document.");
    });
}

/// Build the configured `ListSource`.
pub fn build_source(cfg: &Config) -> Arc<dyn ListSource> {
    match cfg.source_mode {
        SourceMode::Http => Arc::new(
            HttpBridgeSource::new(&cfg.source_base_url, cfg.credentials.clone())
                .with_timeout(cfg.fetch_timeout()),
        ),
        SourceMode::Fixture => Arc::new(FixtureSource::from_dir(&cfg.fixture_dir)),
    }
}
