// src/config.rs
//! Runtime configuration, built once at startup and passed by reference.
//!
//! Layering: built-in defaults -> optional TOML file -> environment.
//! The file is `$LISTFEED_CONFIG` when set (and must exist), otherwise
//! `config/listfeed.toml` when present.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::FeedMeta;
use crate::ingest::filter::FilterConfig;

pub const ENV_CONFIG_PATH: &str = "LISTFEED_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/listfeed.toml";
/// Upper bound for `update_interval_minutes` (7 days).
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Opaque to the pipeline; handed to the source adapter as-is.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.username) && set(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Http,
    Fixture,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub credentials: Credentials,
    pub source_mode: SourceMode,
    pub source_base_url: String,
    pub fixture_dir: PathBuf,
    pub list_ids: Vec<String>,
    pub update_interval_minutes: u64,
    pub max_items_per_list: usize,
    pub max_feed_entries: usize,
    pub min_text_length: usize,
    pub filter_reposts: bool,
    pub filter_replies: bool,
    pub expand_threads: bool,
    pub feed_title: String,
    pub feed_description: String,
    pub feed_link: String,
    pub output_dir: PathBuf,
    pub api_token: Option<String>,
    pub bind_addr: String,
    pub fetch_timeout_secs: u64,
    pub list_delay_ms: u64,
    pub warmup_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            source_mode: SourceMode::Http,
            source_base_url: "http://127.0.0.1:3001".to_string(),
            fixture_dir: PathBuf::from("fixtures"),
            list_ids: Vec::new(),
            update_interval_minutes: 30,
            max_items_per_list: 50,
            max_feed_entries: 500,
            min_text_length: 10,
            filter_reposts: false,
            filter_replies: false,
            expand_threads: false,
            feed_title: "List Feed".to_string(),
            feed_description: "Aggregated posts from monitored lists".to_string(),
            feed_link: "https://x.com".to_string(),
            output_dir: PathBuf::from("output"),
            api_token: None,
            bind_addr: "0.0.0.0:3000".to_string(),
            fetch_timeout_secs: 10,
            list_delay_ms: 2_000,
            warmup_secs: 10,
        }
    }
}

impl Config {
    /// Defaults, then the config file (if any), then the process environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from_file(&path)?
            }
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Config = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Overlay environment values. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SOURCE_USERNAME") {
            self.credentials.username = Some(v);
        }
        if let Some(v) = get("SOURCE_PASSWORD") {
            self.credentials.password = Some(v);
        }
        if let Some(v) = get("SOURCE_EMAIL") {
            self.credentials.email = Some(v);
        }
        if let Some(v) = get("SOURCE_MODE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "http" => self.source_mode = SourceMode::Http,
                "fixture" => self.source_mode = SourceMode::Fixture,
                other => tracing::warn!(value = other, "SOURCE_MODE not recognized; keeping {:?}", self.source_mode),
            }
        }
        if let Some(v) = get("SOURCE_BASE_URL") {
            self.source_base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = get("FIXTURE_DIR") {
            self.fixture_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LIST_IDS") {
            self.list_ids = parse_list_ids(&v);
        }

        set_parsed(&mut self.update_interval_minutes, "UPDATE_INTERVAL_MINUTES", get("UPDATE_INTERVAL_MINUTES"));
        set_parsed(&mut self.max_items_per_list, "MAX_ITEMS_PER_LIST", get("MAX_ITEMS_PER_LIST"));
        set_parsed(&mut self.max_feed_entries, "MAX_FEED_ENTRIES", get("MAX_FEED_ENTRIES"));
        set_parsed(&mut self.min_text_length, "MIN_TEXT_LENGTH", get("MIN_TEXT_LENGTH"));
        set_parsed(&mut self.fetch_timeout_secs, "FETCH_TIMEOUT_SECS", get("FETCH_TIMEOUT_SECS"));
        set_parsed(&mut self.list_delay_ms, "LIST_DELAY_MS", get("LIST_DELAY_MS"));
        set_parsed(&mut self.warmup_secs, "WARMUP_SECS", get("WARMUP_SECS"));

        set_flag(&mut self.filter_reposts, "FILTER_REPOSTS", get("FILTER_REPOSTS"));
        set_flag(&mut self.filter_replies, "FILTER_REPLIES", get("FILTER_REPLIES"));
        set_flag(&mut self.expand_threads, "EXPAND_THREADS", get("EXPAND_THREADS"));

        if let Some(v) = get("FEED_TITLE") {
            self.feed_title = v;
        }
        if let Some(v) = get("FEED_DESCRIPTION") {
            self.feed_description = v;
        }
        if let Some(v) = get("FEED_LINK") {
            self.feed_link = v;
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("API_TOKEN") {
            self.api_token = Some(v.trim().to_string());
        }
        if let Some(v) = get("BIND_ADDR") {
            self.bind_addr = v;
        }
    }

    /// Clamp values that would stall or empty the pipeline.
    pub fn sanitize(&mut self) {
        let defaults = Config::default();
        if self.update_interval_minutes == 0 {
            tracing::warn!("update interval of 0 minutes; using 1");
            self.update_interval_minutes = 1;
        }
        if self.update_interval_minutes > MAX_INTERVAL_MINUTES {
            tracing::warn!(
                minutes = self.update_interval_minutes,
                "update interval too large; using {MAX_INTERVAL_MINUTES}"
            );
            self.update_interval_minutes = MAX_INTERVAL_MINUTES;
        }
        if self.max_items_per_list == 0 {
            self.max_items_per_list = defaults.max_items_per_list;
        }
        if self.max_feed_entries == 0 {
            self.max_feed_entries = defaults.max_feed_entries;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = defaults.fetch_timeout_secs;
        }
        if self.api_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.api_token = None;
        }
        self.list_ids = clean_list_ids(std::mem::take(&mut self.list_ids));
    }

    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            exclude_reposts: self.filter_reposts,
            exclude_replies: self.filter_replies,
            min_length: self.min_text_length,
        }
    }

    pub fn feed_meta(&self) -> FeedMeta {
        FeedMeta {
            title: self.feed_title.clone(),
            description: self.feed_description.clone(),
            link: self.feed_link.clone(),
            ttl_minutes: self.update_interval_minutes,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.saturating_mul(60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn list_delay(&self) -> Duration {
        Duration::from_millis(self.list_delay_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }
}

fn set_parsed<T: std::str::FromStr + fmt::Debug>(slot: &mut T, key: &str, raw: Option<String>) {
    if let Some(raw) = raw {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "not a number; keeping {:?}", slot),
        }
    }
}

fn set_flag(slot: &mut bool, key: &str, raw: Option<String>) {
    if let Some(raw) = raw {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *slot = true,
            "0" | "false" | "no" | "off" => *slot = false,
            _ => tracing::warn!(key, value = %raw, "not a boolean; keeping {}", slot),
        }
    }
}

static RE_LIST_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/lists/([A-Za-z0-9_-]+)").expect("list url regex"));

/// Split a comma-separated `LIST_IDS` value.
pub fn parse_list_ids(s: &str) -> Vec<String> {
    clean_list_ids(s.split(',').map(str::to_string).collect())
}

/// Trim, unwrap list URLs to their id, drop empties and duplicates
/// (first occurrence wins).
pub fn clean_list_ids(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        let id = RE_LIST_URL
            .captures(t)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(t);
        if !id.is_empty() && seen.insert(id.to_string()) {
            out.push(id.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.update_interval_minutes, 30);
        assert_eq!(c.max_items_per_list, 50);
        assert_eq!(c.max_feed_entries, 500);
        assert_eq!(c.min_text_length, 10);
        assert!(!c.filter_reposts && !c.filter_replies && !c.expand_threads);
        assert_eq!(c.api_token(), None);
    }

    #[test]
    fn huge_interval_is_clamped() {
        let big = u64::MAX.to_string();
        let mut c = Config::default();
        c.apply_env(env(&[("UPDATE_INTERVAL_MINUTES", big.as_str())]));
        assert_eq!(c.update_interval_minutes, u64::MAX);
        assert_eq!(c.poll_interval(), Duration::from_secs(u64::MAX));
        c.sanitize();
        assert_eq!(c.update_interval_minutes, MAX_INTERVAL_MINUTES);
        assert_eq!(c.poll_interval(), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn list_ids_accept_urls_and_drop_duplicates() {
        let ids = parse_list_ids(" 123 ,,https://x.com/i/lists/456, 123,twitter.com/i/lists/789?s=20 ");
        assert_eq!(ids, vec!["123", "456", "789"]);
    }

    #[test]
    fn env_overrides_and_bad_values_keep_previous() {
        let mut c = Config::default();
        c.apply_env(env(&[
            ("LIST_IDS", "1,2"),
            ("UPDATE_INTERVAL_MINUTES", "15"),
            ("MAX_FEED_ENTRIES", "lots"),
            ("FILTER_REPLIES", "true"),
            ("FILTER_REPOSTS", "maybe"),
            ("API_TOKEN", " secret "),
            ("SOURCE_PASSWORD", "hunter2"),
        ]));
        c.sanitize();
        assert_eq!(c.list_ids, vec!["1", "2"]);
        assert_eq!(c.update_interval_minutes, 15);
        assert_eq!(c.max_feed_entries, 500);
        assert!(c.filter_replies);
        assert!(!c.filter_reposts);
        assert_eq!(c.api_token(), Some("secret"));
        assert!(!format!("{:?}", c.credentials).contains("hunter2"));
    }

    #[test]
    fn toml_file_then_sanitize() {
        let c = Config::from_toml_str(
            r#"
list_ids = ["https://x.com/i/lists/42", "42", "7"]
update_interval_minutes = 0
max_items_per_list = 0
api_token = "  "
source_mode = "fixture"

[credentials]
username = "bot"
password = "pw"
"#,
        )
        .unwrap();
        assert_eq!(c.list_ids, vec!["42", "7"]);
        assert_eq!(c.update_interval_minutes, 1);
        assert_eq!(c.max_items_per_list, 50);
        assert_eq!(c.api_token(), None);
        assert_eq!(c.source_mode, SourceMode::Fixture);
        assert!(c.credentials.is_complete());
    }

    #[test]
    fn derived_views() {
        let mut c = Config::default();
        c.filter_replies = true;
        c.min_text_length = 3;
        assert_eq!(
            c.filter(),
            FilterConfig {
                exclude_reposts: false,
                exclude_replies: true,
                min_length: 3
            }
        );
        assert_eq!(c.poll_interval(), Duration::from_secs(1800));
        assert_eq!(c.feed_meta().ttl_minutes, 30);
    }
}
