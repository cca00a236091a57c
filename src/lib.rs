pub mod assembler;
pub mod classifier;
pub mod config;
pub mod deduper;
pub mod fetcher;
pub mod llm;
pub mod normalizer;
pub mod pipeline;
pub mod selector;
pub mod summarizer;
pub mod types;

pub use assembler::assemble;
pub use classifier::{classify_all, Classify, LlmClassifier, RuleClassifier};
pub use config::DigestConfig;
pub use deduper::dedupe;
pub use fetcher::FeedFetcher;
pub use llm::{ChatApi, HttpChatApi, MockChatApi, MockOutcome};
pub use normalizer::{normalize, normalize_all};
pub use pipeline::{DigestPipeline, DigestPipelineBuilder};
pub use selector::{group_by_category, select};
pub use summarizer::{MemoryCache, Summarizer, SummaryCache};
pub use types::*;
