//! News digest command-line driver.
//!
//! Pulls stories through the summarization pipeline against a SQLite cache
//! and runs cache expiry.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use news_digest::{
    run_expiry, spawn_expiry_sweep, CacheStore, LocalCompletionBackend, OpenAiConfig, OpenAiSummarizer,
    Orchestrator, SqliteStore, Story,
};
use page_content::{EmbedRegistry, FetchConfig, HttpFetcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DigestConfig;

#[derive(Parser)]
#[command(name = "digest", about = "Summarize news stories through a tiered cache", version)]
struct Cli {
    /// Stories processed at once (overrides CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// SQLite cache URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull every story in a JSON array of {url, title, score, author}
    Pull { file: PathBuf },

    /// Pull a single URL
    Url {
        url: String,
        #[arg(long, default_value_t = 0)]
        score: i64,
    },

    /// Run one expiry sweep and print what was removed
    Expire,

    /// Run expiry sweeps periodically until interrupted
    Sweep {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "digest=info,news_digest=info,page_content=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    EmbedRegistry::builtin().map_err(|e| anyhow::anyhow!("Embed registry is invalid: {e}"))?;

    let cli = Cli::parse();
    let mut config = DigestConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }

    let store = Arc::new(
        SqliteStore::new(&config.database_url)
            .await
            .with_context(|| format!("Failed to open cache at {}", config.database_url))?,
    );

    match cli.command {
        Command::Pull { file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let stories: Vec<Story> = serde_json::from_str(&raw).context("Stories must be a JSON array")?;
            let orchestrator = build_orchestrator(&config, store)?;
            for record in orchestrator.pull_batch(&stories, config.concurrency).await {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Url { url, score } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let record = orchestrator.pull_content(&Story::new(url, score)).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Expire => {
            let report = run_expiry(store.as_ref(), &config.expiry_policy()).await?;
            println!(
                "expired {} summaries past retention, {} unsettled summaries, {} translations",
                report.long, report.short, report.translations
            );
        }
        Command::Sweep { interval_secs } => {
            let handle = spawn_expiry_sweep(store, config.expiry_policy(), Duration::from_secs(interval_secs));
            tracing::info!(interval_secs, "Expiry sweep running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            handle.abort();
            tracing::info!("Expiry sweep stopped");
        }
    }

    Ok(())
}

fn build_orchestrator(config: &DigestConfig, store: Arc<dyn CacheStore>) -> Result<Orchestrator> {
    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default()).context("Failed to build HTTP client")?);
    let mut orchestrator = Orchestrator::new(store, fetcher).with_config(config.summary_config());

    match &config.openai_api_key {
        Some(key) => {
            let mut openai = OpenAiConfig::new(key).with_model(&config.openai_model);
            if let Some(base) = &config.openai_api_base {
                openai = openai.with_base_url(base);
            }
            let hosted = Arc::new(OpenAiSummarizer::new(openai).context("Failed to build hosted summarizer")?);
            orchestrator = orchestrator.with_external(hosted.clone()).with_translator(hosted);
        }
        None => tracing::info!("OPENAI_API_KEY not set, hosted summarizer disabled"),
    }

    if let Some(endpoint) = &config.llama_endpoint {
        let llama = LocalCompletionBackend::llm(endpoint, config.summary_size).context("Failed to build llama backend")?;
        orchestrator = orchestrator.with_local(Arc::new(llama));
    }
    if let Some(endpoint) = &config.transformer_endpoint {
        let transformer = LocalCompletionBackend::seq2seq(endpoint, config.summary_size)
            .context("Failed to build transformer backend")?;
        orchestrator = orchestrator.with_local(Arc::new(transformer));
    }

    Ok(orchestrator)
}
