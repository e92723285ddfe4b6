//! Utility functions for date handling, string manipulation, and file system operations.
//!
//! - Email `Date` header parsing with lenient fallbacks
//! - String truncation for logging
//! - JSON error detection for handling LLM response truncation
//! - File system validation for output directories

use chrono::{DateTime, Local, NaiveDate};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Today's local date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Date a newsletter was sent, from its raw `Date` header.
///
/// Tries RFC 2822 on the whole header, then with a trailing `(comment)`
/// removed, then `%a, %d %b %Y` on the first four tokens. Falls back to
/// `fallback` when nothing parses.
pub fn parse_email_date(header: &str, fallback: NaiveDate) -> NaiveDate {
    let header = header.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(header) {
        return dt.date_naive();
    }

    let without_comment = header.split(" (").next().unwrap_or(header).trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(without_comment) {
        return dt.date_naive();
    }

    let leading = header.split_whitespace().take(4).collect::<Vec<_>>().join(" ");
    if let Ok(date) = NaiveDate::parse_from_str(&leading, "%a, %d %b %Y") {
        return date;
    }

    debug!(%header, "Unparseable Date header; using fallback");
    fallback
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary)
/// with an ellipsis and the number of dropped bytes appended.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Subject line made safe for plain terminals: non-ASCII becomes `?`,
/// and the result is capped at `max` characters.
pub fn ascii_preview(s: &str, max: usize) -> String {
    s.chars()
        .take(max)
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a
/// probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
