use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use news_digest::llm::HttpChatApi;
use news_digest::types::taipei_offset;
use news_digest::{ChatApi, DigestConfig, DigestPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "news-digest", about = "Daily multilingual news digest pipeline")]
struct Cli {
    /// Path to the digest configuration document.
    #[arg(long, default_value = "config/digest.json")]
    config: PathBuf,

    /// Run date (YYYY-MM-DD); defaults to today in Asia/Taipei.
    #[arg(long)]
    date: Option<String>,

    /// Output directory for digest.json and run_summary.json.
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Skip the external summarization API entirely; every summary takes
    /// the excerpt/title fallback path.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = DigestConfig::from_path(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let run_date = match &cli.date {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("invalid --date {date}"))?,
        None => Utc::now().with_timezone(&taipei_offset()).date_naive(),
    };

    let chat_api: Option<Arc<dyn ChatApi>> = if cli.offline {
        info!("offline mode: summaries will use excerpt/title fallback");
        None
    } else {
        match std::env::var(&config.summarization.api_key_env) {
            Ok(api_key) => Some(Arc::new(HttpChatApi::new(&config.summarization, api_key)?)),
            Err(_) => {
                warn!(
                    env = %config.summarization.api_key_env,
                    "API key not set, continuing without external summarization"
                );
                None
            }
        }
    };

    let mut builder = DigestPipeline::builder(config);
    if let Some(api) = chat_api {
        builder = builder.with_chat_api(api);
    }
    let pipeline = builder.build();

    info!(date = %run_date, "starting digest run");
    let (digest, summary) = pipeline.run_live(run_date).await?;

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating output dir {}", cli.out.display()))?;
    let digest_path = cli.out.join("digest.json");
    let summary_path = cli.out.join("run_summary.json");
    std::fs::write(&digest_path, serde_json::to_string_pretty(&digest)?)?;
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

    info!(
        digest = %digest_path.display(),
        summary = %summary_path.display(),
        tabs = digest.tabs.len(),
        "digest written"
    );
    Ok(())
}
