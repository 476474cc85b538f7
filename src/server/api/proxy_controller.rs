// the proxy itself, players hit this for every playlist and segment so it stays lean: nothing is
// cached, playlists are rewritten in memory, everything else is streamed straight through
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{debug, info, warn};

use crate::server::{
    error::{AppResult, Error},
    extractors::{ProxyContext, ProxyRequest},
    services::{
        edge_services::EdgeServices,
        upstream_services::{UpstreamFailure, UpstreamFetch},
    },
    utils::playlist_utils::{
        PLAYLIST_CONTENT_TYPE, PayloadKind, PlaylistRewriter, SEGMENT_CONTENT_TYPE,
        path_has_suffix,
    },
};

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            // bare /proxy only exists so a missing url gets a proper 400
            .route("/proxy", get(Self::proxy).head(Self::proxy))
            .route("/proxy/{*encoded_url}", get(Self::proxy).head(Self::proxy))
    }

    async fn proxy(ProxyRequest(ctx, services): ProxyRequest) -> AppResult<Response> {
        let result = Self::forward(&ctx, &services).await;

        match &result {
            Ok(response) => info!("{} {} -> {}", ctx.method, ctx.target, response.status()),
            Err(e) => warn!(
                "{} {} -> {} ({})",
                ctx.method,
                ctx.target,
                e.status_code(),
                e
            ),
        }

        result
    }

    async fn forward(ctx: &ProxyContext, services: &EdgeServices) -> AppResult<Response> {
        let head_only = ctx.method == Method::HEAD;

        // a HEAD on a playlist has to report the rewritten length, which needs the body
        let upstream_method = if head_only && path_has_suffix(&ctx.target, ".m3u8") {
            Method::GET
        } else {
            ctx.method.clone()
        };

        let mut fetch =
            Self::fetch(ctx, services, upstream_method, ctx.upstream_headers.clone()).await?;
        let mut kind = Self::classify(ctx, &fetch.response);

        // a playlist only rewrites whole, so a HEAD answer or a partial one gets fetched again in
        // full. the suffix check in the extractor misses playlists known only by content type
        let partial = fetch.response.status() == StatusCode::PARTIAL_CONTENT
            || fetch.response.headers().contains_key(header::CONTENT_RANGE);
        if kind == PayloadKind::Playlist && (fetch.method == Method::HEAD || partial) {
            debug!(
                "refetching playlist {} in full (upstream {} {})",
                ctx.target,
                fetch.method,
                fetch.response.status()
            );
            let mut headers = ctx.upstream_headers.clone();
            headers.remove(header::RANGE);
            fetch = Self::fetch(ctx, services, Method::GET, headers).await?;
            kind = Self::classify(ctx, &fetch.response);
        }

        match kind {
            PayloadKind::Playlist => {
                Self::rewrite_playlist(ctx, services, fetch.response, head_only).await
            }
            _ => Ok(Self::relay(fetch, kind, head_only)),
        }
    }

    async fn fetch(
        ctx: &ProxyContext,
        services: &EdgeServices,
        method: Method,
        headers: HeaderMap,
    ) -> AppResult<UpstreamFetch> {
        let fetch = services
            .upstream
            .fetch(&ctx.target, method, headers)
            .await
            .map_err(|failure| Self::unavailable(ctx, failure))?;

        let status = fetch.response.status();
        if !status.is_success() {
            // the error page is often a huge cloudflare html blob, it never gets relayed
            return Err(Error::UpstreamStatus {
                status,
                url: ctx.target.to_string(),
            });
        }

        Ok(fetch)
    }

    fn unavailable(ctx: &ProxyContext, failure: UpstreamFailure) -> Error {
        Error::UpstreamUnavailable {
            kind: failure.error.kind(),
            message: failure.to_string(),
            url: ctx.target.to_string(),
            status: failure.previous_status.map(|s| s.as_u16()),
            status_text: failure
                .previous_status
                .and_then(|s| s.canonical_reason())
                .map(str::to_string),
        }
    }

    fn classify(ctx: &ProxyContext, response: &reqwest::Response) -> PayloadKind {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        // redirects can land on a url with a different suffix, either one counts
        PayloadKind::classify(content_type, &[&ctx.target, response.url()])
    }

    async fn rewrite_playlist(
        ctx: &ProxyContext,
        services: &EdgeServices,
        response: reqwest::Response,
        head_only: bool,
    ) -> AppResult<Response> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .filter(|v| v.to_str().is_ok_and(|s| s.to_ascii_lowercase().contains("mpegurl")))
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(PLAYLIST_CONTENT_TYPE));

        // relative references resolve against where the playlist actually came from
        let source = response.url().clone();
        let status = response.status();

        // headers arriving in time says nothing about the body, an origin can stall after them
        let text = services
            .upstream
            .read_text(response)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                kind: e.kind(),
                message: format!("failed to read playlist body: {}", e),
                url: ctx.target.to_string(),
                status: Some(status.as_u16()),
                status_text: status.canonical_reason().map(str::to_string),
            })?;

        let rewritten = PlaylistRewriter::new(&ctx.addon_base, &ctx.overrides).rewrite(&text, &source);
        debug!(
            "playlist {} rewritten from {} to {} bytes",
            source,
            text.len(),
            rewritten.len()
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(header::CONTENT_TYPE, content_type);
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        Self::insert_live_headers(&mut response_headers);

        let body = if head_only {
            Body::empty()
        } else {
            Body::from(rewritten)
        };

        Ok((StatusCode::OK, response_headers, body).into_response())
    }

    /// streams anything that isn't a playlist, HEAD never touches the upstream body
    fn relay(fetch: UpstreamFetch, kind: PayloadKind, head_only: bool) -> Response {
        let response = fetch.response;
        let status = response.status();
        let upstream_headers = response.headers();

        let mut response_headers = HeaderMap::new();

        match upstream_headers.get(header::CONTENT_TYPE) {
            Some(content_type) => {
                response_headers.insert(header::CONTENT_TYPE, content_type.clone());
            }
            None if kind == PayloadKind::Segment => {
                response_headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(SEGMENT_CONTENT_TYPE),
                );
            }
            None => {}
        }

        // passing the encoding through is only right while reqwest is built without decompression
        for name in [
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::CONTENT_ENCODING,
            header::ACCEPT_RANGES,
        ] {
            if let Some(value) = upstream_headers.get(&name) {
                response_headers.insert(name, value.clone());
            }
        }

        if kind.is_live() {
            Self::insert_live_headers(&mut response_headers);
        }

        let body = if head_only {
            Body::empty()
        } else {
            Body::from_stream(response.bytes_stream())
        };

        (status, response_headers, body).into_response()
    }

    fn insert_live_headers(headers: &mut HeaderMap) {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
}
