use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hearth_connection::{ConnectionManager, ConnectionState};
use hearth_observability::{Criticality, DependencyStatus, HealthRegistry, MetricsRegistry};
use hearth_pipeline::Pipeline;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Separate listeners per §6: `health_bind_addr` serves `/health` and
/// `/ready`, `metrics_bind_addr` serves `/metrics`. Neither depends on the
/// other staying up.
#[derive(Clone)]
struct HealthState {
    health: Arc<HealthRegistry>,
    connection: Arc<ConnectionManager>,
    pipeline: Arc<Pipeline>,
}

#[derive(Clone)]
struct MetricsState {
    metrics: Arc<MetricsRegistry>,
}

fn status_str(status: DependencyStatus) -> &'static str {
    match status {
        DependencyStatus::Healthy => "healthy",
        DependencyStatus::Degraded => "degraded",
        DependencyStatus::Unhealthy => "unhealthy",
    }
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let summary = state.health.summary();
    let conn = state.connection.status();
    let pipeline_stats = state.pipeline.stats();

    let dependencies: serde_json::Map<String, serde_json::Value> = summary
        .dependencies
        .iter()
        .map(|dep| {
            (
                dep.name.to_string(),
                json!({
                    "status": status_str(dep.status),
                    "critical": dep.criticality == Criticality::Critical,
                    "detail": dep.detail,
                }),
            )
        })
        .collect();

    let body = json!({
        "status": status_str(summary.status),
        "uptime_seconds": summary.uptime.as_secs(),
        "subscription": {
            "is_subscribed": conn.state == ConnectionState::Subscribed,
            "state": conn.state.as_str(),
            "connection_attempts": conn.attempts,
            "successful_connections": conn.successes,
            "failures": conn.failures,
            "decode_errors": conn.decode_errors,
            "retry_count": conn.retry_count,
            "last_error": conn.last_error,
        },
        "pipeline": {
            "submitted": pipeline_stats.submitted,
            "stored": pipeline_stats.stored,
            "failed": pipeline_stats.failed,
            "queue_depth": pipeline_stats.queue_depth,
        },
        "dependencies": dependencies,
    });

    let code = match summary.status {
        DependencyStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(body))
}

async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if state.health.summary().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render_text(),
    )
}

pub async fn serve_health(
    addr: String,
    health: Arc<HealthRegistry>,
    connection: Arc<ConnectionManager>,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<()> {
    let state = HealthState {
        health,
        connection,
        pipeline,
    };
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(%addr, "health endpoint listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn serve_metrics(addr: String, metrics: Arc<MetricsRegistry>) -> anyhow::Result<()> {
    let state = MetricsState { metrics };
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(%addr, "metrics endpoint listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
