//! JSON artifacts passed between pipeline stages.
//!
//! Files are pretty-printed UTF-8 with non-ASCII characters kept as-is, so a
//! human reviewer can read and edit them between stages.

use crate::models::{DateRange, RankedStoriesFile, RawStoriesFile};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Raw model answer from the ranking stage.
pub const DEBUG_RESPONSE_FILE: &str = "debug_dedup_response.txt";
/// JSON block extracted from that answer.
pub const DEBUG_JSON_FILE: &str = "debug_dedup_json.txt";

pub fn raw_stories_path(output_dir: &Path, range: &DateRange) -> PathBuf {
    output_dir.join(format!("raw_stories_{}_COMPLETE.json", range.file_stem()))
}

pub fn ranked_stories_path(output_dir: &Path, range: &DateRange) -> PathBuf {
    output_dir.join(format!("ranked_stories_{}.json", range.file_stem()))
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }
    fs::write(path, json).await?;
    info!("Wrote JSON artifact");
    Ok(())
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| format!("reading {}: {e}", path.display()))?;
    let value = serde_json::from_str(&raw).map_err(|e| format!("parsing {}: {e}", path.display()))?;
    Ok(value)
}

pub async fn write_raw_stories(file: &RawStoriesFile, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let path = raw_stories_path(output_dir, &file.date_range);
    write_json(file, &path).await?;
    Ok(path)
}

pub async fn write_ranked_stories(file: &RankedStoriesFile, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let path = ranked_stories_path(output_dir, &file.date_range);
    write_json(file, &path).await?;
    Ok(path)
}

/// Save a model answer verbatim for debugging.
pub async fn write_debug(output_dir: &Path, name: &str, contents: &str) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(name);
    fs::write(&path, contents).await?;
    info!(path = %path.display(), bytes = contents.len(), "Saved debug dump");
    Ok(path)
}
