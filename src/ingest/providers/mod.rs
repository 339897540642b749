// src/ingest/providers/mod.rs
pub mod fixture;
pub mod http_bridge;

use metrics::counter;
use serde::Deserialize;

use crate::ingest::types::RawItem;

/// Tolerant list envelope: bridges answer with a bare array or wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope {
    Bare(Vec<serde_json::Value>),
    Items { items: Vec<serde_json::Value> },
    Tweets { tweets: Vec<serde_json::Value> },
    Data { data: Vec<serde_json::Value> },
}

/// Decode a list payload element by element; one malformed element costs
/// only that element.
pub fn decode_list(body: &str, source: &'static str) -> anyhow::Result<Vec<RawItem>> {
    let env: ListEnvelope = serde_json::from_str(body.trim())?;
    let values = match env {
        ListEnvelope::Bare(v)
        | ListEnvelope::Items { items: v }
        | ListEnvelope::Tweets { tweets: v }
        | ListEnvelope::Data { data: v } => v,
    };
    let mut out = Vec::with_capacity(values.len());
    for (position, v) in values.into_iter().enumerate() {
        match serde_json::from_value::<RawItem>(v) {
            Ok(raw) => out.push(raw),
            Err(e) => {
                tracing::warn!(provider = source, position, error = %e, "skipping malformed item");
                counter!("ingest_invalid_items_total").increment(1);
            }
        }
    }
    Ok(out)
}

/// Detail payloads are either the item itself or wrapped in `item`/`data`.
pub fn decode_detail(body: &str) -> anyhow::Result<RawItem> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DetailEnvelope {
        Item { item: RawItem },
        Data { data: RawItem },
        Bare(RawItem),
    }
    Ok(match serde_json::from_str::<DetailEnvelope>(body.trim())? {
        DetailEnvelope::Item { item } | DetailEnvelope::Data { data: item } | DetailEnvelope::Bare(item) => item,
    })
}
