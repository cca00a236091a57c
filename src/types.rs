use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feed language, fixed at normalization time by the feed's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
    Ja,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
            Language::Ja => "ja",
        }
    }
}

/// Top-level digest grouping. Two Chinese tabs share a language but not content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TabKey {
    #[serde(rename = "zh")]
    Zh,
    #[serde(rename = "zh-industry")]
    ZhIndustry,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ja")]
    Ja,
}

impl TabKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabKey::Zh => "zh",
            TabKey::ZhIndustry => "zh-industry",
            TabKey::En => "en",
            TabKey::Ja => "ja",
        }
    }
}

impl std::fmt::Display for TabKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card size assigned by the selector from the article's rank within its section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Hero,
    Medium,
    Small,
}

/// Which path produced the final summary text. Recorded for observability
/// and test assertions, never rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Llm,
    RssExcerpt,
    TitleFallback,
}

/// Raw feed entry as produced by the transport, with the owning feed's
/// configuration metadata stamped on at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub feed_url: String,
    pub source_name: String,
    pub tab: TabKey,
    pub language: Language,
    /// Category declared on the feed in configuration, when the feed maps
    /// directly to one section.
    pub feed_category: Option<String>,
}

/// One normalized news item flowing through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// GUID when the feed provides one, else the canonical URL.
    pub id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    /// Compared in UTC internally; converted to Asia/Taipei only for display.
    pub published_at: DateTime<Utc>,
    pub raw_content: String,
    pub language: Language,
    pub tab: TabKey,
    pub feed_category: Option<String>,
    pub category: Option<String>,
    pub card_type: Option<CardType>,
    pub summary: Option<String>,
    pub summary_source: Option<SummarySource>,
}

/// The complete digest document for one run. Immutable once assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub date: String,
    pub tabs: Vec<DigestTab>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestTab {
    pub key: TabKey,
    pub label: String,
    pub sections: Vec<DigestSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSection {
    pub key: String,
    pub label: String,
    pub cards: Vec<DigestCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestCard {
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub title: String,
    /// `"source · YYYY-MM-DD"`, date in Asia/Taipei.
    pub meta: String,
    pub summary: String,
    pub url: String,
}

/// Per-stage accounting written beside the digest after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub entries_fetched: usize,
    pub articles_normalized: usize,
    pub articles_deduplicated: usize,
    pub articles_classified: usize,
    pub articles_selected: usize,
    pub summaries_generated: usize,
    pub summary_counts: SummaryCounts,
    /// Tab key -> number of sections that survived selection.
    pub sections_by_tab: std::collections::BTreeMap<String, usize>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub llm: usize,
    pub rss_excerpt: usize,
    pub title_fallback: usize,
}

impl SummaryCounts {
    pub fn record(&mut self, source: SummarySource) {
        match source {
            SummarySource::Llm => self.llm += 1,
            SummarySource::RssExcerpt => self.rss_excerpt += 1,
            SummarySource::TitleFallback => self.title_fallback += 1,
        }
    }
}

/// Display timezone for card dates. Taipei has no DST, so a fixed offset
/// is sufficient.
pub fn taipei_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("static +08:00 offset")
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("feed ingestion failed for {url}: {reason}")]
    Ingestion { url: String, reason: String },

    #[error("invalid entry: {0}")]
    Validation(String),

    #[error("no category resolved for article {id}")]
    Classification { id: String },

    #[error("summarization failed for {id}: {reason}")]
    Summarization { id: String, reason: String },

    #[error("section {tab}/{category} has only {have} candidates")]
    InsufficientContent {
        tab: TabKey,
        category: String,
        have: usize,
    },

    #[error("no section across any tab has sufficient content")]
    EmptyRun,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DigestError>;
