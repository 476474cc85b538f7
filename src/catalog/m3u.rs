// parsers for the channel feed, the feed is either an extended m3u (what most fta lineups are
// published as) or a json array of channels
use std::collections::BTreeMap;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::model::{Channel, parse_inline_headers};

static ATTRIBUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).expect("attribute regex is valid"));

/// picks the parser based on what the body looks like
pub fn parse_channel_feed(body: &str) -> anyhow::Result<Vec<Channel>> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();

    if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("channel feed is not a valid json channel list")
    } else if trimmed.starts_with("#EXTM3U") || trimmed.starts_with("#EXTINF") {
        Ok(parse_m3u(trimmed))
    } else {
        anyhow::bail!("channel feed is neither json nor an m3u playlist")
    }
}

#[derive(Default)]
struct PendingEntry {
    attributes: BTreeMap<String, String>,
    display_name: Option<String>,
    headers: BTreeMap<String, String>,
}

impl PendingEntry {
    fn take_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key).filter(|v| !v.is_empty())
    }
}

/// extended m3u, one `#EXTINF` per entry followed by the url line
pub fn parse_m3u(body: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            if pending.is_some() {
                debug!("EXTINF without a url, dropping the previous entry");
            }
            pending = Some(parse_extinf(info));
        } else if let Some(opt) = line.strip_prefix("#EXTVLCOPT:") {
            let Some(entry) = pending.as_mut() else {
                continue;
            };
            if let Some((key, value)) = opt.split_once('=') {
                match key.trim().to_ascii_lowercase().as_str() {
                    "http-user-agent" => {
                        entry
                            .headers
                            .insert("User-Agent".to_string(), value.trim().to_string());
                    }
                    "http-referrer" | "http-referer" => {
                        entry
                            .headers
                            .insert("Referer".to_string(), value.trim().to_string());
                    }
                    "http-origin" => {
                        entry
                            .headers
                            .insert("Origin".to_string(), value.trim().to_string());
                    }
                    _ => {}
                }
            }
        } else if line.starts_with('#') {
            continue;
        } else if let Some(entry) = pending.take() {
            match build_channel(entry, line) {
                Some(channel) => channels.push(channel),
                None => warn!("skipping m3u entry without a usable name: {}", line),
            }
        }
    }

    channels
}

fn parse_extinf(info: &str) -> PendingEntry {
    // the display name is whatever follows the last comma that isn't inside quotes
    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in info.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => split_at = Some(idx),
            _ => {}
        }
    }

    let (attrs, name) = match split_at {
        Some(idx) => (&info[..idx], Some(info[idx + 1..].trim())),
        None => (info, None),
    };

    let attributes = ATTRIBUTE_RE
        .captures_iter(attrs)
        .map(|cap| (cap[1].to_ascii_lowercase(), cap[2].trim().to_string()))
        .collect();

    PendingEntry {
        attributes,
        display_name: name.filter(|n| !n.is_empty()).map(str::to_string),
        headers: BTreeMap::new(),
    }
}

fn build_channel(mut entry: PendingEntry, url_line: &str) -> Option<Channel> {
    let name = entry
        .display_name
        .take()
        .or_else(|| entry.take_attribute("tvg-name"))?;

    let id = entry
        .take_attribute("tvg-id")
        .unwrap_or_else(|| slugify(&name));
    if id.is_empty() {
        return None;
    }

    let channel_number = entry
        .take_attribute("tvg-chno")
        .or_else(|| entry.take_attribute("channel-number"))
        .and_then(|n| n.parse().ok());
    let logo = entry.take_attribute("tvg-logo");
    let group = entry.take_attribute("group-title");

    // inline headers stay on the url, the structured map gets them too so callers can use either
    let mut headers = entry.headers;
    if let Some((_, inline)) = url_line.split_once('|') {
        for (name, value) in parse_inline_headers(inline) {
            headers.entry(name).or_insert(value);
        }
    }

    Some(Channel {
        id,
        name,
        logo,
        channel_number,
        group,
        url: url_line.to_string(),
        headers,
    })
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINEUP: &str = r#"#EXTM3U x-tvg-url="https://epg.example.test/guide.xml"
#EXTINF:-1 tvg-id="abc.au" tvg-logo="https://logo.test/abc.png" tvg-chno="2" group-title="News, Current Affairs",ABC News
https://abc.example.test/live/index.m3u8
#EXTINF:-1 tvg-chno="3" group-title="General",SBS One
#EXTVLCOPT:http-user-agent=SBSPlayer/1.0
#EXTVLCOPT:http-referrer=https://sbs.example.test/
https://sbs.example.test/one.m3u8|Origin=https%3A%2F%2Fsbs.example.test
#EXTINF:-1,
https://nameless.example.test/x.m3u8
"#;

    #[test]
    fn parses_attributes_and_display_name() {
        let channels = parse_m3u(LINEUP);
        assert_eq!(channels.len(), 2);

        let abc = &channels[0];
        assert_eq!(abc.id, "abc.au");
        assert_eq!(abc.name, "ABC News");
        assert_eq!(abc.channel_number, Some(2));
        assert_eq!(abc.group.as_deref(), Some("News, Current Affairs"));
        assert_eq!(abc.logo.as_deref(), Some("https://logo.test/abc.png"));
        assert!(abc.headers.is_empty());
    }

    #[test]
    fn collects_vlc_options_and_inline_headers() {
        let channels = parse_m3u(LINEUP);
        let sbs = &channels[1];

        assert_eq!(sbs.id, "sbs-one");
        assert_eq!(sbs.headers.get("User-Agent").map(String::as_str), Some("SBSPlayer/1.0"));
        assert_eq!(
            sbs.headers.get("Referer").map(String::as_str),
            Some("https://sbs.example.test/")
        );
        assert_eq!(
            sbs.headers.get("Origin").map(String::as_str),
            Some("https://sbs.example.test")
        );
    }

    #[test]
    fn json_feed_is_detected() {
        let body = r#"[{"id":"7","name":"Seven","channelNumber":7,"logoURL":"https://logo.test/7.png","url":"https://seven.test/live.m3u8","headers":{"Referer":"https://7plus.test/"}}]"#;
        let channels = parse_channel_feed(body).expect("json feed parses");

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].logo.as_deref(), Some("https://logo.test/7.png"));
        assert_eq!(channels[0].channel_number, Some(7));
    }

    #[test]
    fn garbage_feed_is_an_error() {
        assert!(parse_channel_feed("<html>nope</html>").is_err());
    }
}
