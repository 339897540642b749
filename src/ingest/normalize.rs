// src/ingest/normalize.rs
//! RawItem -> Item. Pure apart from logging: `now` is injected so a missing
//! timestamp resolves deterministically in tests.

use chrono::{DateTime, Utc};
use metrics::counter;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::PipelineError;
use crate::ingest::types::{Author, Engagement, Item, Media, MediaKind, RawItem, RawTimestamp};

pub const UNKNOWN_HANDLE: &str = "unknown";
const CANONICAL_HOST: &str = "https://x.com";

/// Epoch values above this are milliseconds (10^12 ms is Sept 2001).
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

pub fn canonical_url(handle: &str, id: &str) -> String {
    format!("{CANONICAL_HOST}/{handle}/status/{id}")
}

/// Decode HTML entities the bridge passes through (`&amp;`, `&gt;`) and trim.
pub fn clean_text(s: &str) -> String {
    html_escape::decode_html_entities(s).trim().to_string()
}

pub fn normalize(raw: RawItem, now: DateTime<Utc>) -> Result<Item, PipelineError> {
    let id = raw
        .id
        .map(|id| id.into_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PipelineError::InvalidItem("missing identifier".to_string()))?;

    let handle = raw
        .username
        .as_deref()
        .map(str::trim)
        .map(|h| h.trim_start_matches('@'))
        .filter(|h| !h.is_empty())
        .unwrap_or(UNKNOWN_HANDLE)
        .to_string();
    let display_name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| handle.clone());

    let mut media = Vec::with_capacity(raw.photos.len() + raw.videos.len());
    for (kind, list) in [(MediaKind::Photo, &raw.photos), (MediaKind::Video, &raw.videos)] {
        media.extend(list.iter().filter_map(|m| m.url()).map(|url| Media {
            kind,
            url: url.to_string(),
        }));
    }

    let thread = raw.thread.map(|nodes| normalize_thread(&id, nodes, now));

    Ok(Item {
        url: canonical_url(&handle, &id),
        text: raw.text.as_deref().map(clean_text).unwrap_or_default(),
        author: Author {
            handle,
            display_name,
            verified: raw.is_verified.unwrap_or(false),
        },
        created_at: resolve_timestamp(raw.timestamp.as_ref(), now),
        is_repost: raw.is_repost.unwrap_or(false),
        is_reply: raw.is_reply.unwrap_or(false),
        parent_id: raw
            .in_reply_to_id
            .map(|p| p.into_string())
            .filter(|p| !p.is_empty()),
        reposted: raw.reposted_item,
        quoted: raw.quoted_item,
        media,
        engagement: Engagement {
            likes: raw.likes.unwrap_or(0),
            reposts: raw.reposts.unwrap_or(0),
            replies: raw.replies.unwrap_or(0),
        },
        thread,
        id,
    })
}

/// A bad thread node is skipped; the parent survives.
fn normalize_thread(parent_id: &str, nodes: Vec<RawItem>, now: DateTime<Utc>) -> Vec<Item> {
    let mut out = Vec::with_capacity(nodes.len());
    for (position, node) in nodes.into_iter().enumerate() {
        match normalize(node, now) {
            Ok(item) => out.push(item),
            Err(e) => {
                tracing::warn!(parent_id, position, error = %e, "dropping thread node");
                counter!("ingest_invalid_items_total").increment(1);
            }
        }
    }
    out
}

pub fn resolve_timestamp(ts: Option<&RawTimestamp>, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = match ts {
        Some(RawTimestamp::Integer(n)) => from_epoch(*n),
        Some(RawTimestamp::Float(f)) if f.is_finite() => from_epoch_millis(if *f >= MILLIS_THRESHOLD as f64 {
            *f as i64
        } else {
            (*f * 1000.0) as i64
        }),
        Some(RawTimestamp::Text(s)) => parse_timestamp_str(s),
        _ => None,
    };
    parsed.unwrap_or(now)
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n >= MILLIS_THRESHOLD {
        from_epoch_millis(n)
    } else if n > 0 {
        DateTime::from_timestamp(n, 0)
    } else {
        None
    }
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms > 0 {
        DateTime::from_timestamp_millis(ms)
    } else {
        None
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return from_epoch(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // Legacy API format: "Wed Oct 10 20:19:24 +0000 2018"
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
