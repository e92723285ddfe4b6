//! Markdown digest output.
//!
//! The digest is normally written by the model; [`ranked_to_markdown`] is the
//! local rendering used when that call fails, so a run always ends with a
//! readable file.

use crate::models::{RankedStoriesFile, RankedStory};
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Render ranked stories as Markdown without the model.
pub fn ranked_to_markdown(ranked: &RankedStoriesFile) -> String {
    let mut md = String::new();
    let _ = writeln!(
        md,
        "# AI News: {} to {}\n",
        ranked.date_range.start, ranked.date_range.end
    );

    if !ranked.top_stories.is_empty() {
        md.push_str("## Top Stories\n\n");
        for (i, story) in ranked.top_stories.iter().enumerate() {
            let _ = writeln!(md, "### {}. {}\n", i + 1, story.headline);
            if !story.summary.is_empty() {
                let _ = writeln!(md, "{}\n", story.summary);
            }
            if let Some(line) = sources_line(story) {
                let _ = writeln!(md, "{line}\n");
            }
        }
    }

    if !ranked.secondary_stories.is_empty() {
        md.push_str("## Secondary Stories\n\n");
        for story in &ranked.secondary_stories {
            let _ = writeln!(md, "**{}**", story.headline);
            if !story.summary.is_empty() {
                let _ = writeln!(md, "{}", story.summary);
            }
            md.push('\n');
        }
    }

    if !ranked.launches.is_empty() {
        md.push_str("## Launches\n\n");
        for story in &ranked.launches {
            match story.urls.first() {
                Some(url) => {
                    let _ = writeln!(md, "- [{}]({})", story.headline, url);
                }
                None => {
                    let _ = writeln!(md, "- {}", story.headline);
                }
            }
        }
        md.push('\n');
    }

    if ranked.other_stories_count > 0 {
        let _ = writeln!(md, "_Plus {} other stories this week._", ranked.other_stories_count);
    }

    md
}

fn sources_line(story: &RankedStory) -> Option<String> {
    if story.sources.is_empty() && story.urls.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    if !story.sources.is_empty() {
        parts.push(format!("Sources: {}", story.sources.join(", ")));
    }
    if let Some(url) = story.urls.first() {
        parts.push(format!("[Read more]({url})"));
    }
    Some(format!("_{}_", parts.join(" · ")))
}

/// Write the digest, creating the parent directory if needed.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_digest(markdown: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, markdown).await?;
    info!(bytes = markdown.len(), "Wrote Markdown digest");
    Ok(())
}
