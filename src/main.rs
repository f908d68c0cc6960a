//! TikTok research extractor - collects a user's profile, videos and related
//! resources from the TikTok Research API into a JSON file.
//!
//! Main entry point: parses arguments, runs one extraction and records the
//! requests it used.

mod config;
mod error;
mod extractor;
mod output;
mod tiktok;
mod usage;

use anyhow::Context;
use clap::Parser;
use config::{Config, Credentials};
use extractor::{ExtractionRequest, ExtractionResult, Extractor};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tiktok::client::MAX_DAYS_BACK;
use tiktok::{RelatedResource, ResearchClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "tiktok-extract")]
#[command(about = "Extract a TikTok user's data from the Research API")]
#[command(version)]
struct Cli {
    /// TikTok username (leading @ is ignored)
    #[arg(long, required_unless_present = "init_config")]
    username: Option<String>,

    /// Maximum number of videos to fetch
    #[arg(long, default_value_t = 10)]
    max_videos: usize,

    /// How many days back to search for videos
    #[arg(
        long,
        default_value_t = 90,
        value_parser = clap::value_parser!(u64).range(0..=MAX_DAYS_BACK)
    )]
    days_back: u64,

    /// Fetch comments of the extracted videos
    #[arg(long)]
    include_comments: bool,

    /// Fetch the user's followers
    #[arg(long)]
    include_followers: bool,

    /// Fetch the accounts the user follows
    #[arg(long)]
    include_following: bool,

    /// Fetch videos the user liked
    #[arg(long)]
    include_liked: bool,

    /// Fetch the user's pinned videos
    #[arg(long)]
    include_pinned: bool,

    /// Fetch videos the user reposted
    #[arg(long)]
    include_reposted: bool,

    /// Fetch every related resource
    #[arg(long)]
    include_all: bool,

    /// Related resources to fetch, comma-separated (e.g. comments,followers)
    #[arg(long, value_delimiter = ',')]
    related: Vec<RelatedResource>,

    /// Only fetch comments for the first N videos
    #[arg(long, default_value_t = 10)]
    max_videos_for_comments: usize,

    /// Maximum comments per video
    #[arg(long, default_value_t = 30)]
    max_comments_per_video: usize,

    /// Maximum records per followers/following/liked/pinned/reposted list
    #[arg(long, default_value_t = 100)]
    max_related: usize,

    /// Directory for the output file (overrides config)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Usage log file (overrides config)
    #[arg(long)]
    usage_log: Option<PathBuf>,

    /// Config file (JSONC)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn related_resources(&self) -> BTreeSet<RelatedResource> {
        if self.include_all {
            return RelatedResource::ALL.into_iter().collect();
        }

        let flags = [
            (self.include_comments, RelatedResource::Comments),
            (self.include_followers, RelatedResource::Followers),
            (self.include_following, RelatedResource::Following),
            (self.include_liked, RelatedResource::Liked),
            (self.include_pinned, RelatedResource::Pinned),
            (self.include_reposted, RelatedResource::Reposted),
        ];

        flags
            .into_iter()
            .filter_map(|(on, kind)| on.then_some(kind))
            .chain(self.related.iter().copied())
            .collect()
    }

    fn extraction_request(&self, username: &str) -> ExtractionRequest {
        ExtractionRequest {
            max_videos: self.max_videos,
            days_back: self.days_back,
            max_videos_for_comments: self.max_videos_for_comments,
            max_comments_per_video: self.max_comments_per_video,
            max_related: self.max_related,
            related: self.related_resources(),
            ..ExtractionRequest::new(username.trim_start_matches('@'))
        }
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.usage_log {
            config.usage_log_path = path.clone();
        }
    }
}

/// Main application entry point.
///
/// # Details
/// Runs authenticate → profile → videos → related → output → usage log.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if cli.init_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_config_path()?,
        };
        config.save(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let username = cli
        .username
        .as_deref()
        .context("--username is required")?;
    let request = cli.extraction_request(username);

    let credentials = Credentials::from_env()?;
    let (result, path) = execute(&config, &credentials, &request).await?;

    info!(path = %path.display(), "Run finished");
    println!("\n{}", output::summary(&result));

    Ok(())
}

/// Run one extraction, write its output file and record the requests used.
///
/// # Details
/// The usage log is updated whether the run and the output write succeed
/// or not. A usage log failure is logged and never replaces the run's own
/// error.
async fn execute(
    config: &Config,
    credentials: &Credentials,
    request: &ExtractionRequest,
) -> anyhow::Result<(ExtractionResult, PathBuf)> {
    let extractor = Extractor::new(ResearchClient::new(config)?);

    let outcome = match extractor.run(credentials, request).await {
        Ok(result) => output::write_output(&result, &config.output_dir).map(|path| (result, path)),
        Err(e) => {
            error!("Extraction failed: {e}");
            Err(e.into())
        }
    };

    if let Err(e) = usage::log_usage(
        &config.usage_log_path,
        extractor.request_count(),
        config.daily_limit,
    ) {
        error!("Failed to update usage log: {e:#}");
    }

    outcome
}
