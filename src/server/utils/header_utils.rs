use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use tracing::warn;

use crate::server::error::{AppResult, Error};

// things a caller must never be able to set on the upstream request, they belong to the transport
// or would change how we have to read the body
const BLOCKED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "accept-encoding",
    "upgrade",
    "te",
    "trailer",
    "keep-alive",
    "proxy-connection",
];

/// header overrides a caller passes as `?headers=<json>`
///
/// only string to string pairs that make valid, non transport, header names and values survive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverrides(BTreeMap<String, String>);

impl HeaderOverrides {
    /// parses the already url-decoded query value, anything that isn't a json object is rejected
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            Error::BadRequest(format!("headers must be a json object of strings: {}", e))
        })?;

        let serde_json::Value::Object(object) = value else {
            return Err(Error::BadRequest(
                "headers must be a json object of strings".to_string(),
            ));
        };

        let mut map = BTreeMap::new();
        for (name, value) in object {
            match value {
                serde_json::Value::String(value) => {
                    map.insert(name, value);
                }
                other => warn!("ignoring non-string header override {}: {}", name, other),
            }
        }

        Ok(Self::from_map(map))
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        let accepted = map
            .into_iter()
            .filter(|(name, value)| {
                let lower = name.trim().to_ascii_lowercase();
                if BLOCKED_HEADERS.contains(&lower.as_str()) {
                    warn!("ignoring blocked header override: {}", name);
                    return false;
                }
                if HeaderName::from_bytes(lower.as_bytes()).is_err()
                    || HeaderValue::from_str(value).is_err()
                {
                    warn!("ignoring malformed header override: {}", name);
                    return false;
                }
                true
            })
            .map(|(name, value)| (name.trim().to_string(), value))
            .collect();

        Self(accepted)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// percent-encoded json, ready to drop into `?headers=`
    pub fn to_query_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }

        serde_json::to_string(&self.0)
            .ok()
            .map(|json| urlencoding::encode(&json).into_owned())
    }

    /// overlays the overrides on top of `base`, overrides win key for key
    pub fn apply(&self, mut base: HeaderMap) -> HeaderMap {
        for (name, value) in &self.0 {
            // both were validated in from_map
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            base.insert(name, value);
        }
        base
    }
}

/// what every upstream request starts with
///
/// some broadcasters check the referer exists without caring what it is, hence the single space
pub fn default_upstream_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("tvproxy")),
    );
    headers.insert(header::REFERER, HeaderValue::from_static(" "));
    headers.insert(
        HeaderName::from_static("seekable"),
        HeaderValue::from_static("0"),
    );
    headers
}
