use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, info};

use super::m3u::parse_channel_feed;
use super::model::Channel;

pub type DynChannelFeed = Arc<dyn ChannelFeedTrait + Send + Sync>;

/// where the channel lineup comes from, the registry only cares that it gets channels back
#[automock]
#[async_trait]
pub trait ChannelFeedTrait {
    async fn fetch_channels(&self) -> anyhow::Result<Vec<Channel>>;
}

pub struct HttpChannelFeed {
    feed_url: String,
    http_client: reqwest::Client,
}

impl HttpChannelFeed {
    pub fn new(feed_url: String, user_agent: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            feed_url,
            http_client,
        }
    }
}

#[async_trait]
impl ChannelFeedTrait for HttpChannelFeed {
    async fn fetch_channels(&self) -> anyhow::Result<Vec<Channel>> {
        debug!("fetching channel feed from {}", self.feed_url);

        let response = self
            .http_client
            .get(&self.feed_url)
            .header(reqwest::header::ACCEPT, "application/json, audio/x-mpegurl, */*")
            .send()
            .await
            .context("failed to reach channel feed")?
            .error_for_status()
            .context("channel feed returned an error status")?;

        let body = response
            .text()
            .await
            .context("failed to read channel feed body")?;

        let channels = parse_channel_feed(&body)?;
        if channels.is_empty() {
            anyhow::bail!("channel feed parsed but contained no channels");
        }

        info!("channel feed returned {} channels", channels.len());
        Ok(channels)
    }
}
