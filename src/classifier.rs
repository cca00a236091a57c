use crate::config::DigestConfig;
use crate::llm::{prompts, ChatApi};
use crate::types::{Article, Language, TabKey};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Category resolution seam. Two implementations: deterministic rules, and
/// rules with a constrained LLM fallback tier. Selected by configuration at
/// pipeline construction, not by branching inside the stages.
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, article: &Article, config: &DigestConfig)
        -> Option<(TabKey, String)>;
}

/// Tier 1: the feed's declared category. Tier 2: keyword rules over
/// title + content for Chinese tabs. No default bucket; exhaustion means
/// the article is dropped by the caller.
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn by_feed_mapping(&self, article: &Article, config: &DigestConfig) -> Option<String> {
        let category = article.feed_category.as_deref()?;
        if config.has_category(article.tab, category) {
            Some(category.to_string())
        } else {
            debug!(
                id = %article.id,
                category,
                "feed-declared category not in tab's set"
            );
            None
        }
    }

    fn by_keywords(&self, article: &Article, config: &DigestConfig) -> Option<String> {
        if article.language != Language::Zh {
            return None;
        }
        let haystack = format!("{} {}", article.title, article.raw_content).to_lowercase();

        let mut rules: Vec<_> = config
            .rules
            .iter()
            .filter(|rule| config.has_category(article.tab, &rule.category))
            .collect();
        rules.sort_by_key(|rule| rule.priority);

        for rule in rules {
            for keyword in &rule.keywords {
                if haystack.contains(&keyword.to_lowercase()) {
                    return Some(rule.category.clone());
                }
            }
        }
        None
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classify for RuleClassifier {
    async fn classify(
        &self,
        article: &Article,
        config: &DigestConfig,
    ) -> Option<(TabKey, String)> {
        let category = self
            .by_feed_mapping(article, config)
            .or_else(|| self.by_keywords(article, config))?;
        Some((article.tab, category))
    }
}

/// Rules first; only when both rule tiers fail is the chat API asked to
/// pick one key from the tab's enumerated set. An answer outside the set
/// is a classification failure, never a guess.
pub struct LlmClassifier {
    rules: RuleClassifier,
    api: Arc<dyn ChatApi>,
}

impl LlmClassifier {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            rules: RuleClassifier::new(),
            api,
        }
    }

    async fn by_llm(&self, article: &Article, config: &DigestConfig) -> Option<String> {
        let allowed = config.category_keys(article.tab);
        if allowed.is_empty() {
            return None;
        }
        let (system, user) = prompts::pick_category(article, &allowed);
        match self.api.complete(&system, &user).await {
            Ok(answer) => {
                let answer = answer.trim();
                if allowed.contains(&answer) {
                    debug!(id = %article.id, category = answer, "LLM resolved category");
                    Some(answer.to_string())
                } else {
                    warn!(id = %article.id, answer, "LLM answer outside category set");
                    None
                }
            }
            Err(error) => {
                warn!(id = %article.id, %error, "LLM classification call failed");
                None
            }
        }
    }
}

#[async_trait]
impl Classify for LlmClassifier {
    async fn classify(
        &self,
        article: &Article,
        config: &DigestConfig,
    ) -> Option<(TabKey, String)> {
        if let Some(resolved) = self.rules.classify(article, config).await {
            return Some(resolved);
        }
        let category = self.by_llm(article, config).await?;
        Some((article.tab, category))
    }
}

/// Classify a batch; unresolved articles are dropped with a warning to
/// keep every section pure.
pub async fn classify_all(
    articles: Vec<Article>,
    classifier: &dyn Classify,
    config: &DigestConfig,
) -> Vec<Article> {
    let total = articles.len();
    let mut classified = Vec::with_capacity(total);

    for mut article in articles {
        match classifier.classify(&article, config).await {
            Some((tab, category)) => {
                article.tab = tab;
                article.category = Some(category);
                classified.push(article);
            }
            None => {
                warn!(id = %article.id, title = %article.title, "dropping unclassified article");
            }
        }
    }

    info!(
        classified = classified.len(),
        dropped = total - classified.len(),
        "classified articles"
    );
    classified
}
