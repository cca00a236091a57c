use crate::config::{DigestConfig, FeedSpec, FetchConfig};
use crate::types::{DigestError, Language, RawEntry, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Thin feed transport. Each feed is fetched concurrently with its own
/// timeout and bounded retry; a stuck or failing feed contributes nothing
/// and never blocks or fails the others.
pub struct FeedFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl FeedFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch every configured feed. Entries arrive stamped with the owning
    /// feed's tab/language/category metadata, in config-declared feed
    /// order, which the rest of the pipeline treats as canonical.
    pub async fn fetch_all(&self, config: &DigestConfig) -> Vec<RawEntry> {
        let fetches = config.feeds.iter().map(|feed| {
            let language = config
                .tab(feed.tab)
                .map(|tab| tab.language)
                .unwrap_or(Language::En);
            self.fetch_feed(feed, language)
        });
        let per_feed = futures::future::join_all(fetches).await;

        let mut entries = Vec::new();
        for (feed, result) in config.feeds.iter().zip(per_feed) {
            match result {
                Ok(feed_entries) => entries.extend(feed_entries),
                Err(error) => {
                    warn!(url = %feed.url, %error, "feed ingestion failed, skipping");
                }
            }
        }

        info!(entries = entries.len(), feeds = config.feeds.len(), "feeds fetched");
        entries
    }

    async fn fetch_feed(&self, feed: &FeedSpec, language: Language) -> Result<Vec<RawEntry>> {
        let mut last_error = DigestError::Ingestion {
            url: feed.url.clone(),
            reason: "no attempts made".to_string(),
        };

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(feed, language).await {
                Ok(entries) => {
                    debug!(url = %feed.url, entries = entries.len(), "feed fetched");
                    return Ok(entries);
                }
                Err(error) => {
                    warn!(
                        url = %feed.url,
                        attempt = attempt + 1,
                        %error,
                        "feed fetch attempt failed"
                    );
                    last_error = error;
                    if attempt < self.config.max_retries {
                        let delay = Duration::from_secs(1u64 << attempt.min(3));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn fetch_once(&self, feed: &FeedSpec, language: Language) -> Result<Vec<RawEntry>> {
        let response = self.client.get(&feed.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Ingestion {
                url: feed.url.clone(),
                reason: format!("HTTP {}", status),
            });
        }
        let body = response.bytes().await?;

        let parsed = feed_rs::parser::parse(body.as_ref())
            .map_err(|error| DigestError::Parse(format!("{}: {}", feed.url, error)))?;

        let entries = parsed
            .entries
            .into_iter()
            .take(self.config.max_items_per_feed)
            .filter_map(|entry| to_raw_entry(entry, feed, language))
            .collect();
        Ok(entries)
    }
}

fn to_raw_entry(
    entry: feed_rs::model::Entry,
    feed: &FeedSpec,
    language: Language,
) -> Option<RawEntry> {
    let link = entry.links.first()?.href.clone();
    let title = entry.title.map(|t| t.content).unwrap_or_default();

    // Prefer full content, fall back to the summary element.
    let summary = entry
        .content
        .and_then(|content| content.body)
        .or(entry.summary.map(|s| s.content));

    let published = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc));

    let guid = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id)
    };

    Some(RawEntry {
        title,
        link,
        summary,
        published,
        guid,
        feed_url: feed.url.clone(),
        source_name: feed.source_name.clone(),
        tab: feed.tab,
        language,
        feed_category: feed.category.clone(),
    })
}
