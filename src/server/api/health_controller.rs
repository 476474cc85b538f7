use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::warn;

use crate::logger::Logger;
use crate::server::dtos::health_dto::{HealthResponse, HealthStatus, RegistryHealth};
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint - only looks at the channel registry, never calls upstream
///
/// the proxy keeps working with an empty registry so this stays 200 and just says degraded
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let registry = services.registry.status();

    let status = if registry.channels == 0 {
        warn!("health check: channel registry is empty");
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: Logger::environment_name(services.config.cargo_env).to_string(),
        registry: RegistryHealth {
            channels: registry.channels,
            last_refresh: registry.last_refresh,
            refreshing: registry.refreshing,
        },
    };

    (StatusCode::OK, Json(response))
}
