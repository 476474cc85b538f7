pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware,
    response::Response,
    routing::get,
};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::{Layer, ServiceBuilder};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;

use api::{ChannelController, ProxyController, health_controller::health_endpoint};
use services::edge_services::EdgeServices;

// stamped on every response, preflights included
pub const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Range, Content-Type, Accept";

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// the full router, trailing slashes are trimmed before routing so `/proxy/` lands on `/proxy`
    pub fn app(services: EdgeServices) -> NormalizePath<Router> {
        let cors = Self::cors_layer(&services.config);

        let router = Router::new()
            .merge(ProxyController::app())
            .merge(ChannelController::app())
            // comment this out if the health endpoint isn't wanted
            .route("/health", get(health_endpoint))
            .layer(Extension(services))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::map_response(Self::with_cors_headers))
                    .layer(cors),
            );

        NormalizePathLayer::trim_trailing_slash().layer(router)
    }

    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = EdgeServices::new(config.clone());
        let refresher = services.registry.spawn_refresh_loop();

        let app = Self::app(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("routes initialized, listening on port {}", config.port);

        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("error while starting API server")?;

        refresher.abort();
        info!("server stopped");

        Ok(())
    }

    // the layer answers every OPTIONS request itself, they never reach a handler
    fn cors_layer(config: &AppConfig) -> CorsLayer {
        let origin = config.cors_origin.trim();

        let allow_origin = if origin == "*" || origin.is_empty() {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> = origin
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("ignoring invalid cors origin: {}", o);
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
            .allow_headers([header::RANGE, header::CONTENT_TYPE, header::ACCEPT])
            .expose_headers([
                header::CONTENT_LENGTH,
                header::CONTENT_RANGE,
                header::CONTENT_TYPE,
                header::ACCEPT_RANGES,
            ])
            .max_age(Duration::from_secs(86400))
    }

    // the CorsLayer owns the origin and exposed headers. methods and headers it only sends on
    // preflights, and players want them on everything
    async fn with_cors_headers(mut response: Response) -> Response {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
        response
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // without a signal handler the only way out is killing the process
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("ctrl-c received, shutting down");
    }
}
