use pfsense_api::HaproxyApi;
use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::IntoResponse;
use poem::Response;
use tracing::warn;

use super::server::OpsState;
use crate::metrics::render_metrics;

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    Response::builder()
        .status(status)
        .content_type("text/plain; charset=utf-8")
        .body(body.into())
}

/// 200 when every pfSense endpoint answers, 503 otherwise.
#[handler]
pub async fn health<C: HaproxyApi + 'static>(state: Data<&OpsState<C>>) -> Response {
    let unhealthy: Vec<String> = state
        .manager
        .health_check()
        .await
        .into_iter()
        .filter(|(_, result)| result.is_err())
        .map(|(endpoint, _)| endpoint)
        .collect();

    if unhealthy.is_empty() {
        text(StatusCode::OK, "OK\n")
    } else {
        warn!(endpoints = ?unhealthy, "Health check failed");
        text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable\n")
    }
}

/// 200 once at least one container runtime is available.
#[handler]
pub async fn ready<C: HaproxyApi + 'static>(state: Data<&OpsState<C>>) -> Response {
    if state.runtimes.is_empty() {
        text(
            StatusCode::SERVICE_UNAVAILABLE,
            "Not Ready - No container runtimes available\n",
        )
    } else {
        text(StatusCode::OK, "Ready\n")
    }
}

#[handler]
pub async fn metrics<C: HaproxyApi + 'static>(state: Data<&OpsState<C>>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();
    let endpoints = state.manager.endpoint_stats().await;
    text(StatusCode::OK, render_metrics(&snapshot, &endpoints))
}
