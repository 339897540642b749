// src/bin/run_once.rs
// One pass and exit, for cron-style deployments. Prints the outcome as JSON.

use std::sync::Arc;

use listfeed::{ingest, Aggregator, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    listfeed::init_tracing();

    let cfg = Arc::new(Config::load()?);
    let aggregator = Aggregator::new(Arc::clone(&cfg), ingest::build_source(&cfg));
    aggregator.start().await;

    let result = aggregator.process_all().await;
    aggregator.shutdown().await;

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}
