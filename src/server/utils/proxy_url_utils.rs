use axum::http::{HeaderMap, header};
use url::Url;

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};

pub const PROXY_PATH: &str = "/proxy";

/// percent-encodes an absolute url so it fits in a single path segment
pub fn encode_target(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

/// reverses `encode_target` and makes sure what comes out is something we're willing to fetch
pub fn decode_target(encoded: &str) -> AppResult<String> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(Error::InvalidTarget {
            kind: "missing_url",
            message: "no encoded target url was provided".to_string(),
            url: None,
        });
    }

    let decoded = urlencoding::decode(encoded).map_err(|e| Error::InvalidTarget {
        kind: "invalid_encoding",
        message: format!("target url is not valid percent-encoded utf-8: {}", e),
        url: Some(encoded.to_string()),
    })?;

    if !has_http_scheme(&decoded) {
        return Err(Error::InvalidTarget {
            kind: "invalid_url",
            message: "target url must start with http:// or https://".to_string(),
            url: Some(decoded.into_owned()),
        });
    }

    Ok(decoded.into_owned())
}

/// decoded target as a parsed url, still rejecting anything without a host
pub fn parse_target(encoded: &str) -> AppResult<Url> {
    let decoded = decode_target(encoded)?;

    let url = Url::parse(&decoded).map_err(|e| Error::InvalidTarget {
        kind: "invalid_url",
        message: format!("target url could not be parsed: {}", e),
        url: Some(decoded.clone()),
    })?;

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidTarget {
            kind: "invalid_url",
            message: "target url has no host".to_string(),
            url: Some(decoded),
        });
    }

    Ok(url)
}

fn has_http_scheme(candidate: &str) -> bool {
    let lower = candidate
        .get(..8)
        .unwrap_or(candidate)
        .to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `{addon_base}/proxy/{encoded}[?headers=...]`, `headers_query` is expected to be encoded already
pub fn proxy_link(addon_base: &str, absolute_url: &str, headers_query: Option<&str>) -> String {
    match headers_query {
        Some(query) => format!(
            "{}{}/{}?headers={}",
            addon_base,
            PROXY_PATH,
            encode_target(absolute_url),
            query
        ),
        None => format!(
            "{}{}/{}",
            addon_base,
            PROXY_PATH,
            encode_target(absolute_url)
        ),
    }
}

/// true when the url already goes through this proxy
pub fn is_proxied(addon_base: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(addon_base)
        .is_some_and(|rest| rest.starts_with(PROXY_PATH) && rest[PROXY_PATH.len()..].starts_with('/'))
}

/// public base of this service as the player sees it
pub fn addon_base(headers: &HeaderMap, config: &AppConfig) -> String {
    if let Some(public) = config
        .public_url
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        return public.trim_end_matches('/').to_string();
    }

    let first_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let proto = first_value("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = first_value("x-forwarded-host")
        .or_else(|| first_value(header::HOST.as_str()))
        .unwrap_or_else(|| format!("localhost:{}", config.port));

    format!("{}://{}", proto, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_check_ignores_case() {
        assert!(has_http_scheme("HTTPS://example.test/live.m3u8"));
        assert!(has_http_scheme("http://example.test"));
        assert!(!has_http_scheme("ftp://example.test"));
        assert!(!has_http_scheme("http:/example.test"));
    }

    #[test]
    fn proxied_check_needs_the_proxy_path() {
        let base = "https://tv.example.test";
        assert!(is_proxied(base, "https://tv.example.test/proxy/abc"));
        assert!(!is_proxied(base, "https://tv.example.test/proxyish/abc"));
        assert!(!is_proxied(base, "https://tv.example.test/other/abc"));
        assert!(!is_proxied(base, "https://cdn.example.test/proxy/abc"));
    }
}
