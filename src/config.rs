use crate::types::{DigestError, Language, Result, TabKey};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable configuration for one pipeline run. Loaded once and passed by
/// reference into each stage; no stage reads ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    pub tabs: Vec<TabSpec>,
    pub feeds: Vec<FeedSpec>,
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Wall-clock budget for the whole run; past it the summarizer stops
    /// issuing external calls and degrades to fallback text.
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabSpec {
    pub key: TabKey,
    pub label: String,
    pub language: Language,
    /// Declared order here is the section order in the digest.
    pub categories: Vec<CategorySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSpec {
    pub url: String,
    pub source_name: String,
    pub tab: TabKey,
    /// Direct feed-to-section mapping; the classifier's first tier.
    #[serde(default)]
    pub category: Option<String>,
}

/// Keyword rule for ambiguous Chinese categories. Lower priority number wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: String,
    #[serde(default = "default_rule_priority")]
    pub priority: u8,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_items_per_section")]
    pub items_per_section: usize,
    /// No more than this many cards per source within one section.
    #[serde(default = "default_per_source_cap")]
    pub per_source_cap: usize,
    #[serde(default)]
    pub fuzzy_dedupe: FuzzyDedupeConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            items_per_section: default_items_per_section(),
            per_source_cap: default_per_source_cap(),
            fuzzy_dedupe: FuzzyDedupeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyDedupeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_fuzzy_threshold")]
    pub threshold: f64,
}

impl Default for FuzzyDedupeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_fuzzy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default = "default_summary_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Below this many characters an en/ja description is considered too
    /// thin to excerpt and the external call is used instead.
    #[serde(default = "default_min_excerpt_chars")]
    pub min_excerpt_chars: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_summary_concurrency(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            min_excerpt_chars: default_min_excerpt_chars(),
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_items_per_feed")]
    pub max_items_per_feed: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_fetch_retries(),
            max_items_per_feed: default_max_items_per_feed(),
        }
    }
}

fn default_budget_secs() -> u64 {
    600
}
fn default_rule_priority() -> u8 {
    99
}
fn default_items_per_section() -> usize {
    5
}
fn default_per_source_cap() -> usize {
    2
}
fn default_fuzzy_threshold() -> f64 {
    0.85
}
fn default_summary_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_min_excerpt_chars() -> usize {
    120
}
fn default_api_base() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}
fn default_user_agent() -> String {
    "news-digest/0.1 (RSS Reader)".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_max_items_per_feed() -> usize {
    20
}

impl DigestConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DigestConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn tab(&self, key: TabKey) -> Option<&TabSpec> {
        self.tabs.iter().find(|t| t.key == key)
    }

    /// Enumerated category keys for a tab, in declared section order.
    pub fn category_keys(&self, key: TabKey) -> Vec<&str> {
        self.tab(key)
            .map(|t| t.categories.iter().map(|c| c.key.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn has_category(&self, tab: TabKey, category: &str) -> bool {
        self.tab(tab)
            .map(|t| t.categories.iter().any(|c| c.key == category))
            .unwrap_or(false)
    }

    fn validate(&self) -> Result<()> {
        if self.tabs.is_empty() {
            return Err(DigestError::Config("no tabs declared".to_string()));
        }
        for tab in &self.tabs {
            if tab.categories.is_empty() {
                return Err(DigestError::Config(format!(
                    "tab {} declares no categories",
                    tab.key
                )));
            }
        }
        for feed in &self.feeds {
            let Some(tab) = self.tab(feed.tab) else {
                return Err(DigestError::Config(format!(
                    "feed {} references unknown tab {}",
                    feed.url, feed.tab
                )));
            };
            if let Some(category) = &feed.category {
                if !tab.categories.iter().any(|c| &c.key == category) {
                    return Err(DigestError::Config(format!(
                        "feed {} maps to unknown category {} in tab {}",
                        feed.url, category, feed.tab
                    )));
                }
            }
        }
        for rule in &self.rules {
            let known = self
                .tabs
                .iter()
                .filter(|t| t.language == Language::Zh)
                .any(|t| t.categories.iter().any(|c| c.key == rule.category));
            if !known {
                return Err(DigestError::Config(format!(
                    "keyword rule targets unknown zh category {}",
                    rule.category
                )));
            }
        }
        if self.selection.items_per_section == 0 {
            return Err(DigestError::Config(
                "items_per_section must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
