use axum::Extension;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, header};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::server::error::Error;
use crate::server::services::edge_services::EdgeServices;
use crate::server::utils::header_utils::{HeaderOverrides, default_upstream_headers};
use crate::server::utils::playlist_utils::path_has_suffix;
use crate::server::utils::proxy_url_utils::{PROXY_PATH, addon_base, parse_target};

#[derive(Deserialize)]
struct ProxyQuery {
    headers: Option<String>,
}

/// everything one proxied request needs, built fresh per request and dropped with it
#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub target: Url,
    pub method: Method,
    /// defaults with the caller's overrides on top, plus a forwarded Range
    pub upstream_headers: HeaderMap,
    pub overrides: HeaderOverrides,
    pub addon_base: String,
}

pub struct ProxyRequest(pub ProxyContext, pub EdgeServices);

impl<S> FromRequestParts<S> for ProxyRequest
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let target = parse_target(encoded_segment(parts.uri.path()))?;

        let Query(query): Query<ProxyQuery> = Query::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::BadRequest(format!("invalid query string: {}", e)))?;

        let overrides = match query.headers.as_deref() {
            Some(raw) => HeaderOverrides::parse(raw)?,
            None => HeaderOverrides::default(),
        };

        let upstream_headers = Self::upstream_headers(
            &parts.headers,
            &target,
            &overrides,
            &services.config.upstream_user_agent,
        );

        let addon_base = addon_base(&parts.headers, &services.config);

        debug!(
            "proxy context built for {} (base {}, {} overrides)",
            target,
            addon_base,
            if overrides.is_empty() { "no" } else { "with" }
        );

        Ok(ProxyRequest(
            ProxyContext {
                target,
                method: parts.method.clone(),
                upstream_headers,
                overrides,
                addon_base,
            },
            services,
        ))
    }
}

impl ProxyRequest {
    fn upstream_headers(
        inbound: &HeaderMap,
        target: &Url,
        overrides: &HeaderOverrides,
        user_agent: &str,
    ) -> HeaderMap {
        let mut headers = overrides.apply(default_upstream_headers(user_agent));

        // byte ranges only make sense for media, a partial playlist can't be rewritten
        if !path_has_suffix(target, ".m3u8") {
            if let Some(range) = inbound.get(header::RANGE) {
                headers.insert(header::RANGE, range.clone());
            }
        }

        headers
    }
}

/// the still-encoded target, everything after `/proxy/`
fn encoded_segment(path: &str) -> &str {
    path.strip_prefix(PROXY_PATH)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or("")
}
