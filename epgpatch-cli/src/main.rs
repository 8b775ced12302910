//! Command line runner: scrape the configured channel, merge it into the baseline
//! guide and write the result.

mod baseline;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use epgpatch_core::{EpgPatchService, GuideConfig, today_in_listing_zone};
use epgpatch_provider_tvmao::TvmaoListings;

use crate::baseline::HttpBaseline;

#[derive(Parser)]
#[command(name = "epgpatch", version)]
#[command(about = "Patch a baseline XMLTV guide with a channel schedule scraped from tvmao")]
struct Cli {
    /// Configuration file path; defaults apply when it does not exist
    #[arg(short, long, default_value = "epgpatch.toml")]
    config: PathBuf,

    /// Output file (overrides config)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Baseline guide URL (overrides config)
    #[arg(short, long, value_name = "URL")]
    baseline_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!(
        "epgpatch={level},epgpatch_core={level},epgpatch_provider_tvmao={level}",
        level = cli.log_level
    );
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GuideConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(output) = cli.output {
        config.merge.output_path = output;
    }
    if let Some(baseline_url) = cli.baseline_url {
        config.merge.baseline_url = baseline_url;
    }
    let config = Arc::new(config);

    // HTTP + service setup
    let client = Client::builder()
        .user_agent(config.listings.user_agent.as_str())
        .timeout(config.http.timeout())
        .build()?;

    let listings = TvmaoListings::new(client.clone(), config.listings.clone())?;
    let service = EpgPatchService::new(
        Arc::new(listings),
        Arc::new(HttpBaseline::new(client)),
        Arc::clone(&config),
    )?;

    let today = today_in_listing_zone();
    info!(%today, channel = %config.merge.injected_channel, "starting guide patch");

    let summary = service.run(today).await.context("guide patch failed")?;

    info!(
        programmes = summary.programs,
        channels = summary.channels,
        kept = summary.merge.kept,
        dropped = summary.merge.dropped,
        "generated XML guide: {}",
        summary.output_path.display()
    );
    Ok(())
}
