use std::time::Duration;

use chrono::NaiveDateTime;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::item::Item;
use crate::whitelist::{self, Whitelist};
use crate::window::{self, TimeWindow};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0";

/// Items gathered in one collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    pub items: Vec<Item>,
    pub feeds_failed: usize,
    /// Entries whose timestamp was missing or implausible and became "now"
    pub defaulted_timestamps: usize,
}

pub struct FeedCollector {
    client: Client,
    window: TimeWindow,
}

impl FeedCollector {
    pub fn new(window: TimeWindow) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, window })
    }

    /// Fetch every feed in order. A failing feed contributes no entries and
    /// does not stop the others.
    pub async fn collect(
        &self,
        feeds: &[FeedConfig],
        whitelist: Option<&Whitelist>,
        now: NaiveDateTime,
    ) -> Collection {
        let mut collection = Collection::default();

        for feed in feeds {
            if feed.url.trim().is_empty() {
                warn!("Feed '{}' has no URL, skipping", feed.name);
                continue;
            }

            let bytes = match self.fetch_feed(feed).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to fetch feed '{}': {}", feed.name, e);
                    collection.feeds_failed += 1;
                    continue;
                }
            };

            match parse_items(&feed.name, &bytes, whitelist, self.window, now) {
                Ok(parsed) => {
                    collection.defaulted_timestamps += parsed.defaulted_timestamps;
                    collection.items.extend(parsed.items);
                }
                Err(e) => {
                    error!("Failed to parse feed '{}': {}", feed.name, e);
                    collection.feeds_failed += 1;
                }
            }
        }

        info!("Collection complete, {} items gathered", collection.items.len());
        collection
    }

    async fn fetch_feed(&self, feed: &FeedConfig) -> anyhow::Result<Vec<u8>> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let response = self
            .client
            .get(&feed.url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Parse raw feed bytes into Items, applying the whitelist and the window.
pub fn parse_items(
    source_label: &str,
    bytes: &[u8],
    whitelist: Option<&Whitelist>,
    window: TimeWindow,
    now: NaiveDateTime,
) -> anyhow::Result<Collection> {
    let parsed = parser::parse(bytes)?;
    info!(
        "Feed '{}' returned {} entries",
        source_label,
        parsed.entries.len()
    );

    let mut collection = Collection::default();
    for entry in &parsed.entries {
        let (item, defaulted) = normalize_entry(source_label, entry, now);

        if !whitelist::admits(whitelist, &item.title, &item.summary) {
            debug!("Not on whitelist: {}", item.title);
            continue;
        }
        if !window.contains(item.published, now) {
            debug!("Outside retention window: {}", item.title);
            continue;
        }

        if defaulted {
            collection.defaulted_timestamps += 1;
        }
        collection.items.push(item);
    }

    Ok(collection)
}

/// Build an Item from a feed entry. The flag reports whether the timestamp
/// fell back to `now`.
pub fn normalize_entry(source_label: &str, entry: &Entry, now: NaiveDateTime) -> (Item, bool) {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();

    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let published = window::from_feed_time(entry.published.or(entry.updated), now);

    let item = Item::new(source_label, title, link, entry_summary(entry), published.value());
    (item, published.is_defaulted())
}

/// Entry summary, falling back to the content body.
pub fn entry_summary(entry: &Entry) -> String {
    entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_default()
}
