//! Operational HTTP endpoints.
//!
//! - `/metrics` : Prometheus text format
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 until the first successful refresh, and while draining)
//! - `/status`  : refresh state and effective settings as JSON

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use tablesize_core::exposition::CONTENT_TYPE;

use crate::app_state::AppState;
use crate::config::StalePolicy;
use crate::obs::RefreshStatus;

/// `/status` payload: refresh state plus the settings it runs under.
#[derive(Debug, Serialize)]
pub struct StatusBody<'a> {
    #[serde(flatten)]
    pub refresh: RefreshStatus,
    pub interval_ms: u64,
    pub stale_policy: StalePolicy,
    /// `DB_HOST` as configured; credentials are never echoed.
    pub database_host: &'a str,
    pub database_name: &'a str,
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else if !state.metrics().is_ready() {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn status(State(state): State<AppState>) -> Response {
    let cfg = state.cfg();
    Json(StatusBody {
        refresh: state.metrics().status(),
        interval_ms: cfg.exporter.interval_ms,
        stale_policy: cfg.exporter.stale_policy,
        database_host: &cfg.database.host,
        database_name: &cfg.database.name,
    })
    .into_response()
}
