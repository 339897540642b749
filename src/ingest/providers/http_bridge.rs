// src/ingest/providers/http_bridge.rs
//! `ListSource` over a JSON bridge service that holds the actual session
//! with the social network. Endpoints:
//!
//! - `POST {base}/auth/login` with the configured credentials -> `{"token": "..."}`
//! - `GET  {base}/lists/{id}/items?count={max}`
//! - `GET  {base}/items/{id}` (item with `thread` attached)

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;

use super::{decode_detail, decode_list};
use crate::config::Credentials;
use crate::ingest::types::{ListSource, RawItem};

const NAME: &str = "http-bridge";

pub struct HttpBridgeSource {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
    timeout: Duration,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct LoginReq<'a> {
    username: Option<&'a str>,
    password: Option<&'a str>,
    email: Option<&'a str>,
}

#[derive(Deserialize)]
struct LoginResp {
    token: String,
}

impl HttpBridgeSource {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            token: RwLock::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn bearer(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let t0 = std::time::Instant::now();
        let mut req = self.client.get(url).timeout(self.timeout);
        if let Some(tok) = self.bearer() {
            req = req.bearer_auth(tok);
        }
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                counter!("ingest_provider_errors_total").increment(1);
                return Err(e).with_context(|| format!("GET {url}"));
            }
        };
        let status = resp.status();
        let body = resp.text().await.context("reading bridge body")?;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        if !status.is_success() {
            counter!("ingest_provider_errors_total").increment(1);
            return Err(anyhow!("GET {url} returned {status}"));
        }
        Ok(body)
    }
}

#[async_trait]
impl ListSource for HttpBridgeSource {
    async fn authenticate(&self) -> Result<()> {
        if !self.credentials.is_complete() {
            return Err(anyhow!("source credentials are not configured"));
        }
        let body = LoginReq {
            username: self.credentials.username.as_deref(),
            password: self.credentials.password.as_deref(),
            email: self.credentials.email.as_deref(),
        };
        let resp = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("bridge login request")?
            .error_for_status()
            .context("bridge login rejected")?;
        let LoginResp { token } = resp.json().await.context("bridge login response")?;
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
        tracing::info!(provider = NAME, "authenticated with bridge");
        Ok(())
    }

    async fn fetch_list_items(&self, list_id: &str, max: usize) -> Result<Vec<RawItem>> {
        let url = format!("{}/lists/{}/items?count={}", self.base_url, list_id, max);
        let body = self.get_text(&url).await?;
        let mut items = decode_list(&body, NAME).with_context(|| format!("decoding list {list_id}"))?;
        items.truncate(max);
        Ok(items)
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<RawItem> {
        let url = format!("{}/items/{}", self.base_url, id);
        let body = self.get_text(&url).await?;
        decode_detail(&body).with_context(|| format!("decoding item {id}"))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
