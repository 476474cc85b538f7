use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// a single playable channel as the feed describes it
///
/// channels are replaced wholesale on every registry refresh, nothing ever edits one in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "logoURL", alias = "logoUrl")]
    pub logo: Option<String>,
    #[serde(default)]
    pub channel_number: Option<u32>,
    #[serde(default)]
    pub group: Option<String>,
    /// may carry inline headers as `url|Name=Value&Name=Value`
    #[serde(alias = "playableURL", alias = "playableUrl")]
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Channel {
    /// splits inline headers off the playable url and merges them with the structured map,
    /// the structured map wins on conflicts
    pub fn stream_target(&self) -> (String, BTreeMap<String, String>) {
        let (url, inline) = match self.url.split_once('|') {
            Some((url, inline)) => (url.trim(), parse_inline_headers(inline)),
            None => (self.url.trim(), BTreeMap::new()),
        };

        let mut headers = inline;
        headers.extend(self.headers.clone());

        (url.to_string(), headers)
    }
}

/// `User-Agent=foo&Referer=https%3A%2F%2Fbar` style header suffix
pub fn parse_inline_headers(inline: &str) -> BTreeMap<String, String> {
    inline
        .split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = urlencoding::decode(value.trim())
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.trim().to_string());
            Some((name.to_string(), value))
        })
        .collect()
}

/// immutable view of the channel lineup at one point in time
#[derive(Debug, Clone, Default)]
pub struct ChannelSnapshot {
    pub channels: Vec<Channel>,
    /// monotonic, drives the freshness check
    pub refreshed_at: Option<Instant>,
    /// wall clock, only for reporting
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChannelSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_channels(mut channels: Vec<Channel>) -> Self {
        // numbered channels first in number order, the rest alphabetically
        channels.sort_by(|a, b| {
            let a_key = (a.channel_number.is_none(), a.channel_number, a.name.to_lowercase());
            let b_key = (b.channel_number.is_none(), b.channel_number, b.name.to_lowercase());
            a_key.cmp(&b_key)
        });

        Self {
            channels,
            refreshed_at: Some(Instant::now()),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_stale(&self, freshness: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() > freshness,
            None => true,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }
}
