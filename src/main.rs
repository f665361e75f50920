use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rustysum::{
    completion::AzureOpenAiClient,
    config::{Config, DEFAULT_CHUNK_CHAR_LIMIT, DEFAULT_OVERLAP_RATIO, SummarizerSettings},
    logging,
    metrics::SummaryMetrics,
    retry::RetryingClient,
    summarizer::{Summarizer, SummaryStyle},
    transcripts,
};

#[derive(Parser)]
#[command(
    name = "rustysum",
    about = "Summarize meeting transcripts with Azure OpenAI"
)]
struct Cli {
    /// Folder searched recursively for .txt transcripts.
    #[arg(long, default_value = "./inputs")]
    transcripts_dir: PathBuf,
    /// Folder receiving `<name>_summary.txt` files.
    #[arg(long, default_value = "./outputs")]
    output_dir: PathBuf,
    /// Maximum characters per chunk before splitting.
    #[arg(long, default_value_t = DEFAULT_CHUNK_CHAR_LIMIT)]
    chunk_char_limit: usize,
    /// Fraction of a chunk's lines repeated at the start of the next one.
    #[arg(long, default_value_t = DEFAULT_OVERLAP_RATIO)]
    overlap_ratio: f64,
    /// Send each transcript in a single request.
    #[arg(long)]
    no_chunk: bool,
    /// Transcripts summarized concurrently.
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_tracing();

    let settings = SummarizerSettings::new(cli.chunk_char_limit, cli.overlap_ratio, !cli.no_chunk)
        .context("Invalid chunking options")?;

    let inputs = transcripts::discover_transcripts(&cli.transcripts_dir)?;
    if inputs.is_empty() {
        tracing::error!(dir = %cli.transcripts_dir.display(), "No .txt files found");
        return Ok(ExitCode::FAILURE);
    }
    tracing::info!(
        count = inputs.len(),
        dir = %cli.transcripts_dir.display(),
        "Found transcripts"
    );

    let config = Config::from_env()?;
    let metrics = Arc::new(SummaryMetrics::new());
    let client = RetryingClient::new(
        AzureOpenAiClient::new(&config).context("Failed to build HTTP client")?,
        config.retry_policy(),
    )
    .with_metrics(metrics.clone());
    let summarizer = Arc::new(Summarizer::new(client, settings, SummaryStyle::meeting()));

    let reports = transcripts::summarize_all(
        summarizer,
        inputs,
        cli.output_dir.clone(),
        cli.workers,
        metrics.clone(),
    )
    .await;

    for report in &reports {
        println!("{report}");
    }
    println!(
        "[DONE] Summaries saved in: {}",
        std::path::absolute(&cli.output_dir)
            .unwrap_or(cli.output_dir)
            .display()
    );
    println!("{}", serde_json::to_string(&metrics.snapshot())?);

    Ok(ExitCode::SUCCESS)
}
