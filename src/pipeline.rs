use crate::assembler::assemble;
use crate::classifier::{classify_all, Classify, LlmClassifier, RuleClassifier};
use crate::config::DigestConfig;
use crate::deduper::dedupe;
use crate::fetcher::FeedFetcher;
use crate::llm::ChatApi;
use crate::normalizer::normalize_all;
use crate::selector::{group_by_category, select, SectionKey};
use crate::summarizer::{MemoryCache, Summarizer, SummaryCache};
use crate::types::{Article, Digest, RawEntry, Result, RunSummary, SummaryCounts};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// The digest pipeline: normalize, dedupe, classify, select, summarize,
/// assemble. Every stage is a pure transformation over the article
/// sequence except summarization, which performs bounded external I/O.
pub struct DigestPipeline {
    config: Arc<DigestConfig>,
    classifier: Arc<dyn Classify>,
    summarizer: Summarizer,
}

impl DigestPipeline {
    pub fn builder(config: DigestConfig) -> DigestPipelineBuilder {
        DigestPipelineBuilder::new(config)
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Run one pass over already-fetched entries.
    pub async fn run(
        &self,
        entries: Vec<RawEntry>,
        run_date: NaiveDate,
    ) -> Result<(Digest, RunSummary)> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = Instant::now() + Duration::from_secs(self.config.budget_secs);
        info!(%run_id, entries = entries.len(), "pipeline run starting");

        let entries_fetched = entries.len();
        let normalized = normalize_all(&entries, started_at);
        let articles_normalized = normalized.len();

        let deduped = dedupe(normalized, &self.config.selection.fuzzy_dedupe);
        let articles_deduplicated = deduped.len();

        let classified = classify_all(deduped, self.classifier.as_ref(), &self.config).await;
        let articles_classified = classified.len();

        let selected = select(group_by_category(classified), &self.config.selection);
        let articles_selected = selected.values().map(Vec::len).sum();

        let summarized = self.summarize_selected(selected, deadline).await;
        let mut summary_counts = SummaryCounts::default();
        for article in summarized.values().flatten() {
            if let Some(source) = article.summary_source {
                summary_counts.record(source);
            }
        }
        let summaries_generated = summarized.values().map(Vec::len).sum();

        let digest = assemble(run_date, &summarized, &self.config)?;

        let sections_by_tab = digest
            .tabs
            .iter()
            .map(|tab| (tab.key.as_str().to_string(), tab.sections.len()))
            .collect();

        let finished_at = Utc::now();
        let summary = RunSummary {
            run_id,
            run_date: run_date.format("%Y-%m-%d").to_string(),
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            entries_fetched,
            articles_normalized,
            articles_deduplicated,
            articles_classified,
            articles_selected,
            summaries_generated,
            summary_counts,
            sections_by_tab,
            status: "success".to_string(),
        };

        info!(
            %run_id,
            selected = articles_selected,
            tabs = digest.tabs.len(),
            "pipeline run complete"
        );
        Ok((digest, summary))
    }

    /// Fetch all configured feeds, then run the pipeline over the merged
    /// entry stream.
    pub async fn run_live(&self, run_date: NaiveDate) -> Result<(Digest, RunSummary)> {
        let fetcher = FeedFetcher::new(self.config.fetch.clone())?;
        let entries = fetcher.fetch_all(&self.config).await;
        self.run(entries, run_date).await
    }

    /// Summarization works on the flattened selection so the concurrency
    /// limit spans sections, then the per-section grouping is rebuilt.
    async fn summarize_selected(
        &self,
        selected: BTreeMap<SectionKey, Vec<Article>>,
        deadline: Instant,
    ) -> BTreeMap<SectionKey, Vec<Article>> {
        let mut keys = Vec::with_capacity(selected.len());
        let mut counts = Vec::with_capacity(selected.len());
        let mut flat = Vec::new();
        for (key, articles) in selected {
            keys.push(key);
            counts.push(articles.len());
            flat.extend(articles);
        }

        let mut summarized = self.summarizer.summarize_all(flat, Some(deadline)).await;

        let mut grouped = BTreeMap::new();
        for (key, count) in keys.into_iter().zip(counts) {
            let tail = summarized.split_off(count);
            let head = std::mem::replace(&mut summarized, tail);
            grouped.insert(key, head);
        }
        grouped
    }
}

/// Builder wiring the capability seams: chat API (summaries + LLM
/// classification tier), summary cache, or a fully custom classifier.
pub struct DigestPipelineBuilder {
    config: DigestConfig,
    chat_api: Option<Arc<dyn ChatApi>>,
    cache: Option<Arc<dyn SummaryCache>>,
    classifier: Option<Arc<dyn Classify>>,
}

impl DigestPipelineBuilder {
    pub fn new(config: DigestConfig) -> Self {
        Self {
            config,
            chat_api: None,
            cache: None,
            classifier: None,
        }
    }

    pub fn with_chat_api(mut self, api: Arc<dyn ChatApi>) -> Self {
        self.chat_api = Some(api);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SummaryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classify>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn build(self) -> DigestPipeline {
        let classifier: Arc<dyn Classify> = match (self.classifier, &self.chat_api) {
            (Some(classifier), _) => classifier,
            (None, Some(api)) => Arc::new(LlmClassifier::new(api.clone())),
            (None, None) => Arc::new(RuleClassifier::new()),
        };
        let cache: Arc<dyn SummaryCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let summarizer = Summarizer::new(
            self.chat_api.clone(),
            cache,
            self.config.summarization.clone(),
        );

        DigestPipeline {
            config: Arc::new(self.config),
            classifier,
            summarizer,
        }
    }
}
