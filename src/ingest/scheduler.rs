// src/ingest/scheduler.rs
//! Warm-up one-shot plus periodic ticker, both stopped by one signal.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::PipelineError;
use crate::ingest::aggregator::Aggregator;

/// Longest tick period; keeps `now + period` clear of `Instant` overflow.
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub warmup: Duration,
    pub interval: Duration,
}

impl SchedulerCfg {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            warmup: cfg.warmup(),
            interval: cfg.poll_interval(),
        }
    }
}

pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal both tasks and wait for them. A pass already running is
    /// allowed to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        for t in self.tasks {
            if let Err(e) = t.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

pub fn spawn_scheduler(agg: Arc<Aggregator>, cfg: SchedulerCfg) -> SchedulerHandle {
    let (stop_tx, stop_rx) = watch::channel(false);

    let warmup = {
        let agg = Arc::clone(&agg);
        let mut stop = stop_rx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.wait_for(|s| *s) => return,
                _ = tokio::time::sleep(cfg.warmup) => {}
            }
            run_tick(&agg, "warmup").await;
        })
    };

    let periodic = {
        let mut stop = stop_rx;
        tokio::spawn(async move {
            let period = cfg.interval.clamp(Duration::from_millis(1), MAX_PERIOD);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.wait_for(|s| *s) => break,
                    _ = ticker.tick() => {}
                }
                run_tick(&agg, "interval").await;
            }
        })
    };

    tracing::info!(
        warmup_secs = cfg.warmup.as_secs(),
        interval_secs = cfg.interval.as_secs(),
        "scheduler started"
    );
    SchedulerHandle {
        stop_tx,
        tasks: vec![warmup, periodic],
    }
}

async fn run_tick(agg: &Aggregator, trigger: &'static str) {
    match agg.process_all_if_idle().await {
        None => {}
        Some(Ok(outcome)) => {
            counter!("ingest_runs_total").increment(1);
            tracing::info!(target: "ingest", trigger, count = outcome.count, "scheduled pass done");
        }
        Some(Err(PipelineError::AuthRequired)) => {
            tracing::warn!(trigger, "scheduled pass skipped: source not authenticated");
        }
        Some(Err(e)) => {
            counter!("ingest_runs_total").increment(1);
            tracing::error!(trigger, error = %e, "scheduled pass failed");
        }
    }
}
