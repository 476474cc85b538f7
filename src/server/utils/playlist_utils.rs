use tracing::{debug, warn};
use url::Url;

use super::header_utils::HeaderOverrides;
use super::proxy_url_utils::{is_proxied, proxy_link};

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// what an upstream payload is, decides rewrite vs relay and which caching headers apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Playlist,
    Segment,
    Other,
}

impl PayloadKind {
    /// content-type markers first, then the url suffix (origins love serving m3u8 as text/plain)
    pub fn classify(content_type: Option<&str>, urls: &[&Url]) -> Self {
        let content_type = content_type.unwrap_or("").to_ascii_lowercase();

        if content_type.contains("mpegurl") || urls.iter().any(|u| path_has_suffix(u, ".m3u8")) {
            PayloadKind::Playlist
        } else if content_type.contains("mp2t") || urls.iter().any(|u| path_has_suffix(u, ".ts")) {
            PayloadKind::Segment
        } else {
            PayloadKind::Other
        }
    }

    /// live content must never be cached by anything between us and the player
    pub fn is_live(&self) -> bool {
        matches!(self, PayloadKind::Playlist | PayloadKind::Segment)
    }
}

pub fn path_has_suffix(url: &Url, suffix: &str) -> bool {
    url.path().to_ascii_lowercase().ends_with(suffix)
}

/// rewrites every uri line of an hls playlist to go back through the proxy
pub struct PlaylistRewriter<'a> {
    addon_base: &'a str,
    headers_query: Option<String>,
}

impl<'a> PlaylistRewriter<'a> {
    /// segments fetched through the rewritten links inherit the overrides used for the playlist
    pub fn new(addon_base: &'a str, overrides: &HeaderOverrides) -> Self {
        Self {
            addon_base,
            headers_query: overrides.to_query_value(),
        }
    }

    /// tags, comments and blank lines come out exactly as they went in, line endings included
    pub fn rewrite(&self, body: &str, source: &Url) -> String {
        let mut out = String::with_capacity(body.len() + body.len() / 2);
        let mut rewritten = 0usize;

        for (idx, raw) in body.split('\n').enumerate() {
            if idx > 0 {
                out.push('\n');
            }

            let (line, ending) = match raw.strip_suffix('\r') {
                Some(line) => (line, "\r"),
                None => (raw, ""),
            };

            match self.rewrite_line(line, source) {
                Some(proxied) => {
                    rewritten += 1;
                    out.push_str(&proxied);
                }
                None => out.push_str(line),
            }
            out.push_str(ending);
        }

        debug!("rewrote {} playlist references from {}", rewritten, source);
        out
    }

    fn rewrite_line(&self, line: &str, source: &Url) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        if is_proxied(self.addon_base, trimmed) {
            return None;
        }

        // join covers absolute, protocol-relative and path-relative references
        let resolved = match source.join(trimmed) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("leaving unresolvable playlist line as is: {} ({})", trimmed, e);
                return None;
            }
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            warn!("leaving non-http playlist reference as is: {}", trimmed);
            return None;
        }

        if is_proxied(self.addon_base, resolved.as_str()) {
            return None;
        }

        Some(proxy_link(
            self.addon_base,
            resolved.as_str(),
            self.headers_query.as_deref(),
        ))
    }
}
