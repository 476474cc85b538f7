use std::sync::Arc;

use tracing::info;

use crate::{
    catalog::{DynChannelFeed, HttpChannelFeed},
    config::AppConfig,
};

use super::{registry_services::ChannelRegistry, upstream_services::UpstreamService};

/// process wide service context, cloned into every handler through an axum Extension
///
/// nothing in here is per request, the proxy path builds its own headers and context each time
#[derive(Clone)]
pub struct EdgeServices {
    pub registry: ChannelRegistry,
    pub upstream: Arc<UpstreamService>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let feed = Arc::new(HttpChannelFeed::new(
            config.channel_feed_url.clone(),
            &config.upstream_user_agent,
        )) as DynChannelFeed;

        Self::with_feed(config, feed)
    }

    /// same as `new` but with the channel feed swapped out, handy for tests and alternate feeds
    pub fn with_feed(config: Arc<AppConfig>, feed: DynChannelFeed) -> Self {
        info!("starting edge services...");

        let registry = ChannelRegistry::new(feed, config.channel_refresh_interval());
        let upstream = Arc::new(UpstreamService::new(config.upstream_timeout()));

        info!(
            "registry refreshes every {}s, upstream timeout is {}s",
            config.channel_refresh_secs, config.upstream_timeout_secs
        );

        Self {
            registry,
            upstream,
            config,
        }
    }
}
