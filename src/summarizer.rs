use crate::config::SummarizationConfig;
use crate::llm::{prompts, ChatApi};
use crate::types::{Article, Language, SummarySource};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// zh summaries target ~150 Traditional Chinese characters.
const ZH_TARGET_CHARS: usize = 150;
const ZH_MAX_CHARS: usize = 170;
/// en/ja excerpts are cut at a sentence or word boundary in this window.
const EXCERPT_FLOOR_CHARS: usize = 300;
const EXCERPT_MAX_CHARS: usize = 500;

/// Key-value store injected into the summarizer. The in-process map below
/// covers a single run; a persisted implementation extends caching across
/// runs without touching pipeline logic.
#[async_trait]
pub trait SummaryCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: String, text: String);
}

pub struct MemoryCache {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    async fn put(&self, key: String, text: String) {
        self.inner.write().await.insert(key, text);
    }
}

/// Produces display text for every selected article. External calls are
/// bounded by a global semaphore, deduplicated per cache key, retried with
/// exponential backoff, and always degrade to excerpt or title fallback;
/// one article's failure never fails the run.
pub struct Summarizer {
    api: Option<Arc<dyn ChatApi>>,
    cache: Arc<dyn SummaryCache>,
    semaphore: Arc<Semaphore>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    config: SummarizationConfig,
}

impl Summarizer {
    pub fn new(
        api: Option<Arc<dyn ChatApi>>,
        cache: Arc<dyn SummaryCache>,
        config: SummarizationConfig,
    ) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            api,
            cache,
            semaphore: Arc::new(Semaphore::new(permits)),
            inflight: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Summarize a batch concurrently, preserving input order. `deadline`
    /// is the run's wall-clock budget: past it no further external calls
    /// are issued and remaining articles take the fallback path.
    pub async fn summarize_all(
        &self,
        articles: Vec<Article>,
        deadline: Option<Instant>,
    ) -> Vec<Article> {
        let tasks = articles
            .into_iter()
            .map(|article| self.summarize(article, deadline));
        let summarized = futures::future::join_all(tasks).await;
        info!(count = summarized.len(), "summarization complete");
        summarized
    }

    pub async fn summarize(&self, mut article: Article, deadline: Option<Instant>) -> Article {
        let (text, source) = match article.language {
            Language::Zh => self.summarize_zh(&article, deadline).await,
            Language::En | Language::Ja => self.summarize_excerpt_first(&article, deadline).await,
        };
        debug!(id = %article.id, source = ?source, "summary ready");
        article.summary = Some(text);
        article.summary_source = Some(source);
        article
    }

    /// zh policy: the external call is primary; the RSS excerpt and then
    /// the title are the degradation ladder.
    async fn summarize_zh(
        &self,
        article: &Article,
        deadline: Option<Instant>,
    ) -> (String, SummarySource) {
        let key = cache_key(article);
        if let Some(hit) = self.cache.get(&key).await {
            return (hit, SummarySource::Llm);
        }

        if let Some(api) = self.api.clone() {
            if !deadline_passed(deadline) {
                let lock = self.key_lock(&key).await;
                let _guard = lock.lock().await;
                // Another task may have filled the cache while we waited.
                if let Some(hit) = self.cache.get(&key).await {
                    return (hit, SummarySource::Llm);
                }
                let (system, user) = prompts::zh_summary(article);
                match self
                    .call_with_retry(api.as_ref(), &system, &user, deadline, |text| {
                        conforms(Language::Zh, text)
                    })
                    .await
                {
                    Ok(text) => {
                        self.cache.put(key, text.clone()).await;
                        return (text, SummarySource::Llm);
                    }
                    Err(reason) => {
                        warn!(id = %article.id, reason, "zh summarization failed, falling back");
                    }
                }
            }
        }

        if !article.raw_content.is_empty() {
            (
                truncate_zh(&article.raw_content, ZH_TARGET_CHARS, ZH_MAX_CHARS),
                SummarySource::RssExcerpt,
            )
        } else {
            (
                truncate_chars(&article.title, ZH_MAX_CHARS),
                SummarySource::TitleFallback,
            )
        }
    }

    /// en/ja policy: the RSS excerpt is primary; the external call is used
    /// only for entries whose description is too thin to excerpt.
    async fn summarize_excerpt_first(
        &self,
        article: &Article,
        deadline: Option<Instant>,
    ) -> (String, SummarySource) {
        let content_chars = article.raw_content.chars().count();
        if content_chars >= self.config.min_excerpt_chars {
            return (
                truncate_excerpt(&article.raw_content, EXCERPT_MAX_CHARS, article.language),
                SummarySource::RssExcerpt,
            );
        }

        let key = cache_key(article);
        if let Some(hit) = self.cache.get(&key).await {
            return (hit, SummarySource::Llm);
        }

        if let Some(api) = self.api.clone() {
            if !deadline_passed(deadline) {
                let lock = self.key_lock(&key).await;
                let _guard = lock.lock().await;
                if let Some(hit) = self.cache.get(&key).await {
                    return (hit, SummarySource::Llm);
                }
                let (system, user) = match article.language {
                    Language::Ja => prompts::ja_summary(article),
                    _ => prompts::en_summary(article),
                };
                let language = article.language;
                match self
                    .call_with_retry(api.as_ref(), &system, &user, deadline, |text| {
                        conforms(language, text)
                    })
                    .await
                {
                    Ok(text) => {
                        self.cache.put(key, text.clone()).await;
                        return (text, SummarySource::Llm);
                    }
                    Err(reason) => {
                        warn!(id = %article.id, reason, "summarization failed, falling back");
                    }
                }
            }
        }

        if content_chars > 0 {
            (article.raw_content.clone(), SummarySource::RssExcerpt)
        } else {
            (
                truncate_chars(&article.title, EXCERPT_MAX_CHARS),
                SummarySource::TitleFallback,
            )
        }
    }

    async fn call_with_retry(
        &self,
        api: &dyn ChatApi,
        system: &str,
        user: &str,
        deadline: Option<Instant>,
        valid: impl Fn(&str) -> bool,
    ) -> std::result::Result<String, String> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(1),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        let request_timeout = Duration::from_secs(self.config.request_timeout_secs);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if deadline_passed(deadline) {
                last_error = "run budget exhausted".to_string();
                break;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    last_error = "summarizer shut down".to_string();
                    break;
                }
            };
            let outcome = tokio::time::timeout(request_timeout, api.complete(system, user)).await;
            drop(permit);

            match outcome {
                Ok(Ok(reply)) => {
                    let cleaned = clean_reply(&reply);
                    if valid(&cleaned) {
                        return Ok(cleaned);
                    }
                    last_error = format!(
                        "non-conforming reply ({} chars)",
                        cleaned.chars().count()
                    );
                }
                Ok(Err(error)) => last_error = error.to_string(),
                Err(_) => last_error = "request timed out".to_string(),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error)
    }

    /// At most one in-flight external call per cache key.
    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inflight.lock().await;
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn cache_key(article: &Article) -> String {
    format!("{}:{}", article.id, article.language.as_str())
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn clean_reply(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c| matches!(c, '"' | '“' | '”' | '「' | '」'))
        .trim()
        .to_string()
}

/// Cheap conformance check on an API reply: non-empty, within the hard
/// length cap, and plausibly in the requested language.
fn conforms(language: Language, text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let chars = text.chars().count();
    match language {
        Language::Zh => chars <= ZH_MAX_CHARS && has_cjk(text),
        Language::Ja => chars <= EXCERPT_MAX_CHARS && (has_kana(text) || has_cjk(text)),
        Language::En => chars <= EXCERPT_MAX_CHARS && cjk_ratio(text) < 0.2,
    }
}

fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}

fn has_kana(text: &str) -> bool {
    text.chars().any(|c| ('\u{3040}'..='\u{30FF}').contains(&c))
}

fn cjk_ratio(text: &str) -> f64 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let cjk = text
        .chars()
        .filter(|c| ('\u{3040}'..='\u{9FFF}').contains(c))
        .count();
    cjk as f64 / total as f64
}

/// First ~`target` characters, preferring to end on Chinese punctuation.
/// Content already within `max` passes through untouched, never padded.
fn truncate_zh(text: &str, target: usize, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let floor = target * 2 / 3;
    let mut cut = target;
    for index in (floor..target).rev() {
        if matches!(chars[index], '。' | '，' | '、' | '；' | '！' | '？') {
            cut = index + 1;
            break;
        }
    }
    chars[..cut].iter().collect()
}

/// Cut at a sentence boundary inside the 300-500 window, falling back to a
/// word boundary, then a hard cut.
fn truncate_excerpt(text: &str, max: usize, language: Language) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }

    let floor = EXCERPT_FLOOR_CHARS.min(max * 3 / 5);
    let mut sentence_cut = None;
    for index in (floor..max.min(chars.len())).rev() {
        let is_boundary = match language {
            Language::Ja => matches!(chars[index], '。' | '！' | '？'),
            _ => {
                matches!(chars[index], '.' | '!' | '?')
                    && chars.get(index + 1).map_or(true, |next| next.is_whitespace())
            }
        };
        if is_boundary {
            sentence_cut = Some(index + 1);
            break;
        }
    }
    if let Some(cut) = sentence_cut {
        return chars[..cut].iter().collect::<String>().trim_end().to_string();
    }

    for index in (floor..max).rev() {
        if chars[index].is_whitespace() {
            let head: String = chars[..index].iter().collect();
            return format!("{}...", head.trim_end());
        }
    }

    let head: String = chars[..max - 1].iter().collect();
    format!("{}…", head)
}

fn truncate_chars(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let head: String = chars[..max - 1].iter().collect();
    format!("{}…", head)
}
