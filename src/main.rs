//! Mealsnap - meal photo intelligence pipeline
//!
//! Consumes wire-format media records (JSON lines), consolidates albums, and
//! prints a nutrition estimate per completed album.
//!
//! # Usage
//!
//! ```bash
//! # Live: pipe records from a gateway adapter
//! gateway-adapter | mealsnap
//!
//! # Replay a recorded stream with 200ms pacing
//! mealsnap --replay captures/monday.jsonl --delay-ms 200
//!
//! # No API key needed: canned estimates
//! mealsnap --dry-run
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: analysis API key (name configurable via `analysis.api_key_env`)
//! - `MEALSNAP_CONFIG`: path to a TOML config file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mealsnap::analysis::{Analyzer, FixtureAnalyzer, OpenAiAnalyzer};
use mealsnap::config::{self, AppConfig};
use mealsnap::ingest::{ItemEvent, ItemSource, ReplaySource, StdinSource};
use mealsnap::pipeline::{MediaPipeline, PipelineHandle};
use mealsnap::render;
use mealsnap::stats::UsageStats;
use mealsnap::types::MediaGroup;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "mealsnap")]
#[command(about = "Meal photo intelligence pipeline")]
#[command(version)]
struct CliArgs {
    /// Replay a JSON-lines file of media records instead of reading stdin
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed items in milliseconds (0 = no delay)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Use the fixture analyzer (canned estimates, no network, no API key)
    #[arg(long)]
    dry_run: bool,

    /// Path to a TOML config file (overrides MEALSNAP_CONFIG and ./mealsnap.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

// ============================================================================
// Ingestion and Delivery Loops
// ============================================================================

/// Feed the pipeline from a source until EOF or cancellation.
///
/// Returns true if the source was exhausted, false if cancelled mid-stream.
async fn run_ingestion<S: ItemSource>(
    source: &mut S,
    handle: &PipelineHandle,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion stopped by shutdown signal");
                return false;
            }
            result = source.next_item() => match result {
                Ok(ev) => ev,
                Err(e) => {
                    warn!(source = source.source_name(), error = %e, "source error, stopping ingestion");
                    return true;
                }
            },
        };

        match event {
            ItemEvent::Item(item) => {
                // Blocks while the pipeline is stalled: backpressure, not an error.
                if handle.submit(item).await.is_err() {
                    warn!("pipeline closed while ingesting");
                    return true;
                }
            }
            ItemEvent::Eof => {
                info!(source = source.source_name(), "source reached end of data");
                return true;
            }
        }
    }
}

/// Consume finished groups until the pipeline closes the output stream.
async fn run_delivery(mut output_rx: tokio::sync::mpsc::Receiver<MediaGroup>) -> u64 {
    let mut delivered = 0u64;
    while let Some(group) = output_rx.recv().await {
        delivered += 1;
        info!(
            chat = group.chat_id,
            album = %group.key,
            images = group.urls.len(),
            ok = group.report().is_some(),
            "delivering result"
        );
        println!("=== chat {} ===", group.chat_id);
        if let Some(reply_to) = group.reply_to {
            println!("(in reply to {reply_to})");
        }
        println!("{}", render::render_group(&group));
    }
    delivered
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Load application configuration
    let app_config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    config::init(app_config);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Mealsnap - Meal Photo Intelligence Pipeline");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "⏱️  Idle threshold: {}ms | Tick: {}ms | Shutdown grace: {}ms",
        cfg.pipeline.idle_threshold_ms, cfg.pipeline.tick_interval_ms, cfg.pipeline.shutdown_grace_ms
    );

    // Pick the analyzer
    let analyzer: Arc<dyn Analyzer> = if args.dry_run {
        info!("🧪 Analyzer: fixture (dry run, no network)");
        Arc::new(FixtureAnalyzer::new())
    } else {
        info!(
            "🤖 Analyzer: {} via {}",
            cfg.analysis.model, cfg.analysis.base_url
        );
        Arc::new(
            OpenAiAnalyzer::from_config(&cfg.analysis)
                .context("failed to initialize the analysis client")?,
        )
    };

    // Graceful shutdown via Ctrl+C
    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // Spawn the pipeline and the delivery loop
    let stats = UsageStats::new();
    let (handle, output_rx) =
        MediaPipeline::spawn(analyzer, cfg.pipeline.clone(), Arc::clone(&stats), cancel.clone());
    let delivery = tokio::spawn(run_delivery(output_rx));

    // Drive ingestion from the selected source
    let exhausted = if let Some(path) = &args.replay {
        info!("📥 Input: replay of {} ({}ms pacing)", path.display(), args.delay_ms);
        let mut source = ReplaySource::load(path, args.delay_ms)
            .with_context(|| format!("failed to load replay file {}", path.display()))?;
        run_ingestion(&mut source, &handle, &cancel).await
    } else {
        info!("📥 Input: stdin (JSON wire records, one per line)");
        let mut source = StdinSource::new();
        run_ingestion(&mut source, &handle, &cancel).await
    };

    // Drain: graceful on EOF, grace-bounded on Ctrl+C
    if exhausted {
        handle.finish().await;
    } else {
        handle.shutdown().await;
    }
    let delivered = delivery.await.unwrap_or_default();

    let snapshot = stats.snapshot();
    info!("{}", snapshot);
    info!(delivered, "✓ Mealsnap shutdown complete");
    Ok(())
}
