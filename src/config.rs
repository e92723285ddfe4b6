//! YAML configuration.
//!
//! Every section has defaults, so a missing key (or a near-empty file) still
//! produces a runnable configuration. Secrets are not read from here; they
//! come from the environment through the CLI.
//!
//! ```yaml
//! newsletter_sources:
//!   - ai.plus@axios.com
//!   - news@daily.therundown.ai
//! major_ai_companies: [OpenAI, Anthropic, Google]
//! claude:
//!   model: claude-sonnet-4-5
//!   max_tokens: 16000
//!   temperature: 0.3
//! output:
//!   directory: outputs
//!   filename_format: "newsletter_{start_date}_to_{end_date}.md"
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Sender addresses searched in Gmail.
    pub newsletter_sources: Vec<String>,
    /// Companies whose involvement raises a story's rank.
    pub major_ai_companies: Vec<String>,
    /// Ordered rules mapping a `From` header to a display name.
    pub source_names: Vec<SourceName>,
    pub claude: ClaudeConfig,
    pub gmail: GmailConfig,
    pub output: OutputConfig,
    pub docs: DocsConfig,
    /// Newsletters with less text than this are skipped.
    pub min_text_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClaudeConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: String,
    /// Newsletters sent to the model concurrently during extraction.
    pub parallelism: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GmailConfig {
    /// Token file; defaults to `~/.gmail-mcp/gmail-token.json`.
    pub token_path: Option<PathBuf>,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// `{start_date}` and `{end_date}` are substituted.
    pub filename_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocsConfig {
    pub workflow: PathBuf,
    pub style_guide: PathBuf,
    pub examples: PathBuf,
}

/// Case-insensitive substring `pattern` in the `From` header → `name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceName {
    pub pattern: String,
    pub name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            newsletter_sources: Vec::new(),
            major_ai_companies: [
                "OpenAI",
                "Anthropic",
                "Google",
                "Microsoft",
                "Meta",
                "Apple",
                "Amazon",
                "Nvidia",
                "xAI",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            source_names: default_source_names(),
            claude: ClaudeConfig::default(),
            gmail: GmailConfig::default(),
            output: OutputConfig::default(),
            docs: DocsConfig::default(),
            min_text_chars: 100,
        }
    }
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 16000,
            temperature: 0.3,
            base_url: "https://api.anthropic.com".to_string(),
            parallelism: 1,
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            max_results: 100,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("outputs"),
            filename_format: "newsletter_{start_date}_to_{end_date}.md".to_string(),
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            workflow: PathBuf::from("docs/Newsletter Copy Creation Workflow.md"),
            style_guide: PathBuf::from("docs/Newsletter Style Guide.md"),
            examples: PathBuf::from("docs/Newsletter Stories Example.md"),
        }
    }
}

fn default_source_names() -> Vec<SourceName> {
    [
        ("superhuman", "Superhuman"),
        ("axios", "Axios AI+"),
        ("techcrunch", "TechCrunch"),
        ("thatstartupguy", "That Startup Guy"),
        ("rundown", "The Rundown AI"),
        ("startupintros", "Startup Intros"),
    ]
    .into_iter()
    .map(|(pattern, name)| SourceName {
        pattern: pattern.to_string(),
        name: name.to_string(),
    })
    .collect()
}

impl Config {
    /// Display name for a newsletter sender; the raw header when nothing matches.
    pub fn source_name(&self, from: &str) -> String {
        let from_lower = from.to_lowercase();
        self.source_names
            .iter()
            .find(|rule| from_lower.contains(&rule.pattern.to_lowercase()))
            .map(|rule| rule.name.clone())
            .unwrap_or_else(|| from.to_string())
    }

    /// Digest output path for a date range.
    pub fn digest_path(&self, start_date: &str, end_date: &str) -> PathBuf {
        let filename = self
            .output
            .filename_format
            .replace("{start_date}", start_date)
            .replace("{end_date}", end_date);
        self.output.directory.join(filename)
    }
}

/// Parse configuration from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(yaml)
}

/// Load configuration from a YAML file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_config(path: &Path) -> Result<Config, Box<dyn Error>> {
    let yaml = fs::read_to_string(path)
        .await
        .map_err(|e| format!("reading config {}: {e}", path.display()))?;
    let config = parse_config(&yaml)?;
    info!(
        sources = config.newsletter_sources.len(),
        model = %config.claude.model,
        "Loaded configuration"
    );
    Ok(config)
}
