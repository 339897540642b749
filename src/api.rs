// src/api.rs
//! HTTP surface over the aggregator. Handlers only read the feed store and
//! call `process_all`; the dedup store is never touched from here.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::PipelineError;
use crate::ingest::aggregator::{Aggregator, StatusSnapshot};

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
const FEED_CACHE_CONTROL: &str = "public, max-age=300";

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    api_token: Option<Arc<str>>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        let api_token = aggregator.config().api_token().map(Arc::from);
        Self {
            aggregator,
            api_token,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/feed", get(get_feed))
        .route("/update", post(post_update))
        .route("/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResp {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResp {
            success: false,
            error: msg.into(),
        }),
    )
        .into_response()
}

async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(req).await;
    };
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if provided == Some(expected) {
        next.run(req).await
    } else {
        error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn get_feed(State(state): State<AppState>) -> Response {
    match state.aggregator.feed_document().await {
        Ok(Some(xml)) => (
            [
                (header::CONTENT_TYPE, RSS_CONTENT_TYPE),
                (header::CACHE_CONTROL, FEED_CACHE_CONTROL),
            ],
            xml,
        )
            .into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "Feed not generated yet. Trigger POST /update or wait for the next scheduled run.",
        ),
        Err(e) => {
            tracing::error!(error = %e, "reading feed document");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not read the feed document.")
        }
    }
}

#[derive(Serialize)]
struct UpdateResp {
    success: bool,
    count: usize,
    location: String,
    timestamp: String,
}

async fn post_update(State(state): State<AppState>) -> Response {
    match state.aggregator.process_all().await {
        Ok(outcome) => Json(UpdateResp {
            success: true,
            count: outcome.count,
            location: outcome.location.display().to_string(),
            timestamp: outcome.timestamp.to_rfc3339(),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "manual update failed");
            let status = match e {
                PipelineError::AuthRequired => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.user_message())
        }
    }
}

async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.aggregator.status().await)
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Metrics are not enabled."),
    }
}
