//! # Newsletter Digest
//!
//! Turns a week of AI newsletters sitting in Gmail into a ranked,
//! publishable news digest.
//!
//! ## Usage
//!
//! ```sh
//! ANTHROPIC_API_KEY=... newsletter_digest run --start 2025-11-03 --end 2025-11-10
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Search Gmail for the configured senders and resolve each
//!    email body to plain text
//! 2. **Extraction**: Ask the model for the news stories in each newsletter
//! 3. **Ranking**: Ask the model to deduplicate, tag launches and rank
//! 4. **Formatting**: Ask the model for Markdown copy in the house style
//!
//! Each stage writes an artifact to the output directory, so stages can be
//! rerun individually after a human has reviewed the previous one.

use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod gmail;
mod mime;
mod models;
mod outputs;
mod prompts;
mod stages;
mod utils;

use api::AnthropicClient;
use cli::{Cli, Command};
use config::Config;
use error::ApiError;
use gmail::client::GmailClient;
use models::{DateRange, RankedStoriesFile, RawStoriesFile};
use outputs::{json, markdown};
use prompts::WorkflowDocs;
use stages::format::DigestOrigin;
use utils::ensure_writable_dir;

/// Long enough for a full ranking answer from the model.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsletter_digest starting up");

    let args = Cli::parse();
    debug!(config = %args.config.display(), command = ?args.command, "Parsed CLI arguments");

    let range = match args.command.dates().range() {
        Ok(range) => range,
        Err(e) => {
            error!(error = %e, "Invalid date range");
            return Err(e.into());
        }
    };

    let mut config = config::load_config(&args.config).await?;
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }

    // Early check: ensure the output dir is writable
    if let Err(e) = ensure_writable_dir(&config.output.directory).await {
        error!(
            path = %config.output.directory.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let docs = WorkflowDocs::load(&config.docs).await;
    let llm = anthropic_client(&args, &config, http.clone())?;

    match &args.command {
        Command::Extract { max_results, .. } => {
            let gmail = gmail_client(&args, &config, &http).await?;
            run_extract(&gmail, &llm, &config, &docs, range, *max_results).await?;
        }
        Command::Rank { input, .. } => {
            let input = input
                .clone()
                .unwrap_or_else(|| json::raw_stories_path(&config.output.directory, &range));
            let raw: RawStoriesFile = json::read_json(&input).await?;
            info!(path = %input.display(), stories = raw.stories.len(), "Loaded raw stories");
            run_rank(&llm, &raw, &config, &docs).await?;
        }
        Command::Format { input, .. } => {
            let input = input
                .clone()
                .unwrap_or_else(|| json::ranked_stories_path(&config.output.directory, &range));
            let ranked: RankedStoriesFile = json::read_json(&input).await?;
            info!(path = %input.display(), "Loaded ranked stories");
            run_format(&llm, &ranked, &config, &docs).await?;
        }
        Command::Run { max_results, .. } => {
            let gmail = gmail_client(&args, &config, &http).await?;
            let raw = run_extract(&gmail, &llm, &config, &docs, range, *max_results).await?;
            if raw.stories.is_empty() {
                warn!("No stories extracted. Check the Gmail senders and date range in the config.");
                return Err("no stories extracted".into());
            }
            let ranked = run_rank(&llm, &raw, &config, &docs).await?;
            run_format(&llm, &ranked, &config, &docs).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn anthropic_client(args: &Cli, config: &Config, http: reqwest::Client) -> Result<AnthropicClient, Box<dyn Error>> {
    let api_key = args
        .anthropic_api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            error!("ANTHROPIC_API_KEY not found in environment");
            ApiError::MissingCredentials("set ANTHROPIC_API_KEY or pass --anthropic-api-key".into())
        })?;
    Ok(AnthropicClient::new(http, api_key, config.claude.clone()))
}

async fn gmail_client(args: &Cli, config: &Config, http: &reqwest::Client) -> Result<GmailClient, Box<dyn Error>> {
    let token_path: PathBuf = args
        .token_path
        .clone()
        .or_else(|| config.gmail.token_path.clone())
        .or_else(gmail::auth::default_token_path)
        .ok_or_else(|| ApiError::MissingCredentials("no token path and no home directory".into()))?;
    let token = gmail::auth::access_token(http, args.gmail_access_token.as_deref(), &token_path).await?;
    info!("Authenticated with Gmail API");
    Ok(GmailClient::new(http.clone(), token))
}

#[instrument(level = "info", skip_all, fields(start = %range.start, end = %range.end))]
async fn run_extract(
    gmail: &GmailClient,
    llm: &AnthropicClient,
    config: &Config,
    docs: &WorkflowDocs,
    range: DateRange,
    max_results: Option<usize>,
) -> Result<RawStoriesFile, Box<dyn Error>> {
    if config.newsletter_sources.is_empty() {
        warn!("No newsletter_sources configured; searching every sender in the window");
    }
    let mut config = config.clone();
    if let Some(max) = max_results {
        config.gmail.max_results = max;
    }

    let fetched = stages::extract::fetch_newsletters(gmail, &config, range).await?;
    let stories = stages::extract::extract_stories(llm, &fetched.newsletters, &config, docs).await;
    let file = stages::extract::raw_stories_file(range, &fetched, stories);

    let path = json::write_raw_stories(&file, &config.output.directory).await?;
    info!(
        path = %path.display(),
        newsletters_processed = file.newsletters_processed,
        newsletters_found = file.total_newsletters_found,
        stories = file.stories.len(),
        "Extraction complete"
    );
    Ok(file)
}

#[instrument(level = "info", skip_all)]
async fn run_rank(
    llm: &AnthropicClient,
    raw: &RawStoriesFile,
    config: &Config,
    docs: &WorkflowDocs,
) -> Result<RankedStoriesFile, Box<dyn Error>> {
    let ranked = stages::rank::rank_stories(llm, raw, config, docs, &config.output.directory).await?;
    let path = json::write_ranked_stories(&ranked, &config.output.directory).await?;
    info!(path = %path.display(), "Saved ranked stories; review them before formatting");
    Ok(ranked)
}

#[instrument(level = "info", skip_all)]
async fn run_format(
    llm: &AnthropicClient,
    ranked: &RankedStoriesFile,
    config: &Config,
    docs: &WorkflowDocs,
) -> Result<(), Box<dyn Error>> {
    let (digest, origin) = stages::format::format_digest(llm, ranked, docs).await?;
    if origin == DigestOrigin::LocalFallback {
        warn!("Digest was rendered locally; it has no \"why it matters\" copy");
    }

    let path = config.digest_path(
        &ranked.date_range.start.to_string(),
        &ranked.date_range.end.to_string(),
    );
    write_digest_or_log(&digest, &path).await
}

async fn write_digest_or_log(digest: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = markdown::write_digest(digest, path).await {
        error!(path = %path.display(), error = %e, "Failed writing Markdown digest");
        return Err(e);
    }
    info!(path = %path.display(), "Newsletter ready");
    Ok(())
}
