//! Stage three: turn the ranked stories into publishable Markdown copy.

use crate::api::{AskAsync, ask_with_backoff};
use crate::models::RankedStoriesFile;
use crate::outputs::markdown::ranked_to_markdown;
use crate::prompts::{WorkflowDocs, format_prompt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt;
use tracing::{info, instrument, warn};

static FENCED_MARKDOWN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:markdown|md)?\s*\n(.*?)\n\s*```\s*$").expect("valid fenced-markdown regex")
});

/// Where the digest text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOrigin {
    Model,
    LocalFallback,
}

/// Strip a code fence wrapped around the whole answer, if any.
pub fn unwrap_markdown_fence(text: &str) -> &str {
    FENCED_MARKDOWN
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text.trim(), |m| m.as_str())
}

/// Ask the model to write the digest; fall back to local rendering on failure.
#[instrument(level = "info", skip_all, fields(top = ranked.top_stories.len()))]
pub async fn format_digest<C>(
    client: &C,
    ranked: &RankedStoriesFile,
    docs: &WorkflowDocs,
) -> Result<(String, DigestOrigin), Box<dyn Error>>
where
    C: AskAsync<Response = String> + fmt::Debug,
{
    let prompt = format_prompt(docs, ranked)?;
    match ask_with_backoff(client, &prompt).await {
        Ok(answer) => {
            let markdown = unwrap_markdown_fence(&answer);
            if markdown.is_empty() {
                warn!("Model returned empty copy; using local rendering");
                return Ok((ranked_to_markdown(ranked), DigestOrigin::LocalFallback));
            }
            info!(bytes = markdown.len(), "Formatted digest with model");
            Ok((format!("{markdown}\n"), DigestOrigin::Model))
        }
        Err(e) => {
            warn!(error = %e, "Formatting call failed; using local rendering");
            Ok((ranked_to_markdown(ranked), DigestOrigin::LocalFallback))
        }
    }
}
