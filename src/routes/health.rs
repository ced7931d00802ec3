use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ComponentHealth>,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(latency_ms),
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.jobs.store().ping().await {
        Ok(_) => ComponentHealth::ok(start.elapsed().as_millis() as u64),
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            ComponentHealth::error()
        }
    };

    let redis_check = match &state.queue {
        Some(queue) => {
            let redis_start = std::time::Instant::now();
            let check = match queue.health_check().await {
                Ok(_) => ComponentHealth::ok(redis_start.elapsed().as_millis() as u64),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis health check failed");
                    ComponentHealth::error()
                }
            };
            if let Ok(depth) = queue.queue_depth().await {
                metrics::gauge!("booth_queue_depth").set(depth as f64);
            }
            Some(check)
        }
        None => None,
    };

    let all_healthy = store_check.is_ok() && redis_check.as_ref().map_or(true, ComponentHealth::is_ok);
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        service: "Smart Memento Booth API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        checks: HealthChecks {
            job_store: store_check,
            redis: redis_check,
        },
    };

    (status_code, Json(response))
}

/// GET /ping
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to Smart Memento Booth API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
