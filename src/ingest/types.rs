// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Provider-shaped post as it arrives from the list bridge. Every field is
/// optional, and a field that is `null` or of the wrong type reads as absent
/// rather than failing the whole post; nothing past `normalize` sees this type.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawItem {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(alias = "handle", deserialize_with = "lenient")]
    pub username: Option<String>,
    #[serde(alias = "displayName", deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(alias = "verified", deserialize_with = "lenient")]
    pub is_verified: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(alias = "isRetweet", deserialize_with = "lenient")]
    pub is_repost: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub is_reply: Option<bool>,
    #[serde(alias = "inReplyToStatusId", deserialize_with = "lenient")]
    pub in_reply_to_id: Option<RawId>,
    #[serde(alias = "retweetedStatus", deserialize_with = "lenient")]
    pub reposted_item: Option<serde_json::Value>,
    #[serde(alias = "quotedStatus", deserialize_with = "lenient")]
    pub quoted_item: Option<serde_json::Value>,
    #[serde(deserialize_with = "lenient_vec")]
    pub photos: Vec<RawMedia>,
    #[serde(deserialize_with = "lenient_vec")]
    pub videos: Vec<RawMedia>,
    #[serde(deserialize_with = "lenient")]
    pub likes: Option<u64>,
    #[serde(alias = "retweets", deserialize_with = "lenient")]
    pub reposts: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub replies: Option<u64>,
    #[serde(deserialize_with = "lenient_list")]
    pub thread: Option<Vec<RawItem>>,
}

/// Any value that does not decode as `T` (including `null`) becomes `None`.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = serde_json::Value::deserialize(de)?;
    Ok(serde_json::from_value(v).ok())
}

/// `None` unless the value is an array; elements that do not decode are dropped.
fn lenient_list<'de, D, T>(de: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match serde_json::Value::deserialize(de)? {
        serde_json::Value::Array(values) => Some(
            values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn lenient_vec<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient_list(de)?.unwrap_or_default())
}

/// Identifiers show up both as strings and as bare JSON numbers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawMedia {
    Url(String),
    Object { url: Option<String> },
}

impl RawMedia {
    pub fn url(&self) -> Option<&str> {
        match self {
            RawMedia::Url(u) => Some(u.as_str()),
            RawMedia::Object { url } => url.as_deref(),
        }
        .map(str::trim)
        .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub handle: String,
    pub display_name: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
}

impl Engagement {
    pub fn is_empty(&self) -> bool {
        self.likes == 0 && self.reposts == 0 && self.replies == 0
    }
}

/// Canonical post record. `id` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub is_repost: bool,
    pub is_reply: bool,
    pub parent_id: Option<String>,
    pub reposted: Option<serde_json::Value>,
    pub quoted: Option<serde_json::Value>,
    pub media: Vec<Media>,
    pub engagement: Engagement,
    pub thread: Option<Vec<Item>>,
}

/// Opaque upstream capability. Implementations must not panic on bad
/// payloads; errors are per call and the aggregator recovers from them.
#[async_trait::async_trait]
pub trait ListSource: Send + Sync {
    /// Establish a session with the upstream network.
    async fn authenticate(&self) -> Result<()>;

    /// Up to `max` posts from one list, newest first as the provider returns them.
    async fn fetch_list_items(&self, list_id: &str, max: usize) -> Result<Vec<RawItem>>;

    /// One post with its reply chain attached under `thread`.
    async fn fetch_item_detail(&self, id: &str) -> Result<RawItem>;

    fn name(&self) -> &'static str;
}
