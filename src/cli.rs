//! Command-line interface definitions for Newsletter Digest.
//!
//! Secrets can be given as flags but are normally read from the environment.

use crate::models::DateRange;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Newsletter Digest application.
///
/// # Examples
///
/// ```sh
/// # Whole pipeline for one week
/// newsletter_digest run --start 2025-11-03 --end 2025-11-10
///
/// # One stage at a time, reviewing artifacts in between
/// newsletter_digest extract --start 2025-11-03 --end 2025-11-10
/// newsletter_digest rank --start 2025-11-03 --end 2025-11-10
/// newsletter_digest format --start 2025-11-03 --end 2025-11-10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Directory for artifacts and the digest (overrides `output.directory`)
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Anthropic API key
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Gmail OAuth access token (skips the token file)
    #[arg(long, global = true, env = "GMAIL_ACCESS_TOKEN", hide_env_values = true)]
    pub gmail_access_token: Option<String>,

    /// Gmail token file (overrides `gmail.token_path`)
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch newsletters from Gmail and extract raw stories
    Extract {
        #[command(flatten)]
        dates: DateArgs,

        /// Maximum number of emails to fetch (overrides `gmail.max_results`)
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Deduplicate, rank and categorize extracted stories
    Rank {
        #[command(flatten)]
        dates: DateArgs,

        /// Raw stories file (defaults to the one `extract` writes for these dates)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Format ranked stories into the Markdown digest
    Format {
        #[command(flatten)]
        dates: DateArgs,

        /// Ranked stories file (defaults to the one `rank` writes for these dates)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Run extract, rank and format in sequence
    Run {
        #[command(flatten)]
        dates: DateArgs,

        /// Maximum number of emails to fetch (overrides `gmail.max_results`)
        #[arg(long)]
        max_results: Option<usize>,
    },
}

impl Command {
    pub fn dates(&self) -> &DateArgs {
        match self {
            Command::Extract { dates, .. }
            | Command::Rank { dates, .. }
            | Command::Format { dates, .. }
            | Command::Run { dates, .. } => dates,
        }
    }
}

/// Newsletter window: `after:start before:end` in Gmail terms.
#[derive(Args, Debug, Clone)]
pub struct DateArgs {
    /// Start date (inclusive), YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,

    /// End date (exclusive), YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,
}

impl DateArgs {
    pub fn range(&self) -> Result<DateRange, String> {
        if self.end <= self.start {
            return Err(format!(
                "end date {} must be after start date {}",
                self.end, self.start
            ));
        }
        Ok(DateRange {
            start: self.start,
            end: self.end,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format: {s}. Use YYYY-MM-DD"))
}
