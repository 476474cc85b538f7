use std::fmt;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("upstream did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("could not connect to upstream: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl UpstreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "upstream_timeout",
            UpstreamError::Connect(_) => "upstream_unreachable",
            UpstreamError::Request(_) => "upstream_failed",
        }
    }

    fn from_reqwest(err: reqwest::Error, budget: Duration) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(budget)
        } else if err.is_connect() {
            UpstreamError::Connect(err)
        } else {
            UpstreamError::Request(err)
        }
    }
}

/// a fetch that gave up, `previous_status` is what HEAD answered before the GET fallback failed
#[derive(Debug)]
pub struct UpstreamFailure {
    pub error: UpstreamError,
    pub previous_status: Option<StatusCode>,
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.previous_status {
            Some(status) => write!(f, "{} (HEAD was answered with {})", self.error, status),
            None => write!(f, "{}", self.error),
        }
    }
}

pub struct UpstreamFetch {
    pub response: reqwest::Response,
    /// the method that actually produced `response`
    pub method: Method,
}

/// outbound side of the proxy, nothing here is cached, every call goes to the origin
pub struct UpstreamService {
    http: reqwest::Client,
    timeout: Duration,
}

impl UpstreamService {
    pub fn new(timeout: Duration) -> Self {
        // no client wide timeout, it would cap how long a segment body may take to stream. the read
        // timeout is an idle limit, a stream that stops sending bytes for that long is dropped
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http, timeout }
    }

    /// reads a whole body as text, bounded by the same budget as the request itself
    pub async fn read_text(&self, response: reqwest::Response) -> Result<String, UpstreamError> {
        match tokio::time::timeout(self.timeout, response.text()).await {
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(UpstreamError::from_reqwest(err, self.timeout)),
        }
    }

    /// sends `method`, for HEAD falls back to a single GET when the origin won't answer HEAD
    ///
    /// the GET body is never read on that path, dropping the response closes it
    pub async fn fetch(
        &self,
        url: &Url,
        method: Method,
        headers: HeaderMap,
    ) -> Result<UpstreamFetch, UpstreamFailure> {
        if method != Method::HEAD {
            return self
                .send(url, method.clone(), headers)
                .await
                .map(|response| UpstreamFetch { response, method })
                .map_err(|error| UpstreamFailure {
                    error,
                    previous_status: None,
                });
        }

        let previous_status = match self.send(url, Method::HEAD, headers.clone()).await {
            Ok(response) if !Self::head_rejected(response.status()) => {
                return Ok(UpstreamFetch {
                    response,
                    method: Method::HEAD,
                });
            }
            Ok(response) => {
                debug!(
                    "HEAD answered {} for {}, retrying with GET",
                    response.status(),
                    url
                );
                Some(response.status())
            }
            // the budget is spent, a second attempt would only double the wait
            Err(error @ UpstreamError::Timeout(_)) => {
                return Err(UpstreamFailure {
                    error,
                    previous_status: None,
                });
            }
            Err(error) => {
                warn!("HEAD failed for {} ({}), retrying with GET", url, error);
                None
            }
        };

        self.send(url, Method::GET, headers)
            .await
            .map(|response| UpstreamFetch {
                response,
                method: Method::GET,
            })
            .map_err(|error| UpstreamFailure {
                error,
                previous_status,
            })
    }

    // statuses origins use when they simply don't do HEAD
    fn head_rejected(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::FORBIDDEN
                | StatusCode::METHOD_NOT_ALLOWED
                | StatusCode::NOT_IMPLEMENTED
        )
    }

    async fn send(
        &self,
        url: &Url,
        method: Method,
        headers: HeaderMap,
    ) -> Result<reqwest::Response, UpstreamError> {
        let request = self.http.request(method, url.clone()).headers(headers);

        // dropping the send future on expiry aborts the connection attempt
        match tokio::time::timeout(self.timeout, request.send()).await {
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(UpstreamError::from_reqwest(err, self.timeout)),
        }
    }
}
