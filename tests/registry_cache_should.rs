use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tvproxy::server::services::ChannelRegistry;
use tvproxy::server::services::registry_services::FAILED_REFRESH_BACKOFF;
use tvproxy::{Channel, ChannelFeedTrait, DynChannelFeed, MockChannelFeedTrait};

fn channel(id: &str, number: Option<u32>) -> Channel {
    Channel {
        id: id.to_string(),
        name: id.to_uppercase(),
        logo: None,
        channel_number: number,
        group: None,
        url: format!("https://cdn.example.test/{}/index.m3u8", id),
        headers: BTreeMap::new(),
    }
}

// counts fetches and holds each one until the test lets it through
struct GatedFeed {
    calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedFeed {
    fn new(open: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 }),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelFeedTrait for GatedFeed {
    async fn fetch_channels(&self) -> anyhow::Result<Vec<Channel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await?;
        Ok(vec![channel("news", Some(2)), channel("sport", Some(1))])
    }
}

#[tokio::test]
async fn fetch_once_for_concurrent_cold_reads() {
    let feed = GatedFeed::new(false);
    let registry = ChannelRegistry::new(feed.clone() as DynChannelFeed, Duration::from_secs(3600));

    let readers: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get().await })
        })
        .collect();

    // let every reader reach the pending refresh before the feed answers
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.status().refreshing);
    feed.gate.add_permits(1);

    for reader in readers {
        let snapshot = reader.await.unwrap();
        assert_eq!(snapshot.channels.len(), 2);
    }

    assert_eq!(feed.calls(), 1);
    assert!(!registry.status().refreshing);
}

#[tokio::test]
async fn sort_channels_by_number() {
    let feed = GatedFeed::new(true);
    let registry = ChannelRegistry::new(feed as DynChannelFeed, Duration::from_secs(3600));

    let snapshot = registry.get().await;
    let ids: Vec<&str> = snapshot.channels.iter().map(|c| c.id.as_str()).collect();

    assert_eq!(ids, vec!["sport", "news"]);
}

#[tokio::test]
async fn keep_the_last_good_snapshot_when_a_refresh_fails() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut feed = MockChannelFeedTrait::new();
    feed.expect_fetch_channels().times(2).returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(vec![channel("news", Some(1))])
        } else {
            Err(anyhow::anyhow!("feed is down"))
        }
    });

    let registry = ChannelRegistry::new(Arc::new(feed) as DynChannelFeed, Duration::from_secs(3600));

    let first = registry.refresh().await;
    assert_eq!(first.channels.len(), 1);

    let second = registry.refresh().await;
    assert_eq!(second.channels.len(), 1);
    assert_eq!(second.channels[0].id, "news");

    let status = registry.status();
    assert_eq!(status.channels, 1);
    assert!(status.last_refresh.is_some());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stay_empty_and_retry_when_the_first_fetch_fails() {
    let mut feed = MockChannelFeedTrait::new();
    feed.expect_fetch_channels()
        .times(2)
        .returning(|| Err(anyhow::anyhow!("feed is down")));

    let registry = ChannelRegistry::new(Arc::new(feed) as DynChannelFeed, Duration::from_secs(3600));

    assert!(registry.get().await.is_empty());
    // an empty registry always tries again
    assert!(registry.get().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_only_once_the_snapshot_goes_stale() {
    let feed = GatedFeed::new(true);
    let registry = ChannelRegistry::new(feed.clone() as DynChannelFeed, Duration::from_secs(60));

    registry.get().await;
    registry.get().await;
    assert_eq!(feed.calls(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    registry.get().await;
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn look_up_channels_by_id() {
    let feed = GatedFeed::new(true);
    let registry = ChannelRegistry::new(feed as DynChannelFeed, Duration::from_secs(3600));

    let news = registry.get_channel("news").await;
    assert_eq!(news.map(|c| c.name), Some("NEWS".to_string()));
    assert!(registry.get_channel("missing").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn back_off_from_a_failing_feed_while_a_stale_snapshot_exists() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut feed = MockChannelFeedTrait::new();
    feed.expect_fetch_channels().times(3).returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(vec![channel("news", Some(1))])
        } else {
            Err(anyhow::anyhow!("feed is down"))
        }
    });

    let registry = ChannelRegistry::new(Arc::new(feed) as DynChannelFeed, Duration::from_secs(60));
    registry.get().await;

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(registry.get().await.channels.len(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    // still stale, but the feed just failed
    for _ in 0..5 {
        assert_eq!(registry.get().await.channels.len(), 1);
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    tokio::time::advance(FAILED_REFRESH_BACKOFF + Duration::from_secs(1)).await;
    assert_eq!(registry.get().await.channels.len(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
