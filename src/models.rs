//! Data models for newsletters, extracted stories and the ranked digest.
//!
//! This module defines the structures passed between pipeline stages:
//! - [`EmailSummary`] / [`Newsletter`]: emails as fetched from Gmail
//! - [`RawStory`] / [`RawStoriesFile`]: stage-one extraction output
//! - [`RankedStory`] / [`RankingResult`] / [`RankedStoriesFile`]: stage-two output
//!
//! Field names are snake_case on the wire; they match the JSON schema the
//! prompts ask the model to produce. Story fields are serde-defaulted so a
//! model that omits a key still yields a usable story.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Header summary of a Gmail message, as returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
}

/// A newsletter email with its resolved plain-text body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: String,
    pub from: String,
    pub subject: String,
    /// Raw `Date` header.
    pub date: String,
    pub text: String,
}

impl Newsletter {
    /// Rough token estimate used for logging (four characters per token).
    pub fn estimated_tokens(&self) -> usize {
        self.text.chars().count() / 4
    }
}

/// Inclusive start and exclusive end of the newsletter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `{start}_to_{end}`, the suffix shared by every artifact of one run.
    pub fn file_stem(&self) -> String {
        format!("{}_to_{}", self.start, self.end)
    }
}

/// A news story as extracted from a single newsletter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStory {
    pub headline: String,
    pub source: String,
    /// `YYYY-MM-DD` as reported by the model.
    pub date: String,
    pub summary: String,
    pub url: Option<String>,
}

impl RawStory {
    /// Models sometimes answer `"null"` or `""` instead of JSON `null`.
    pub fn normalize(mut self) -> Self {
        self.url = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case("null"));
        self
    }
}

/// The JSON object the extraction prompt asks for.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractionResponse {
    pub stories: Vec<RawStory>,
}

/// Stage-one artifact: every story found in the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStoriesFile {
    pub extraction_date: NaiveDate,
    pub date_range: DateRange,
    pub newsletters_processed: usize,
    pub total_newsletters_found: usize,
    pub stories: Vec<RawStory>,
    pub notes: String,
}

/// A deduplicated, ranked story possibly merged from several newsletters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankedStory {
    pub headline: String,
    pub summary: String,
    pub sources: Vec<String>,
    pub mention_count: u32,
    pub was_headline: bool,
    pub date: String,
    pub urls: Vec<String>,
    pub is_launch: bool,
    pub involves_major_company: bool,
    pub companies_mentioned: Vec<String>,
}

/// Counts reported by the model about its deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationSummary {
    pub original_story_count: usize,
    pub deduplicated_story_count: usize,
    pub stories_merged: usize,
}

/// The JSON object the ranking prompt asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingResult {
    pub top_stories: Vec<RankedStory>,
    pub secondary_stories: Vec<RankedStory>,
    pub launches: Vec<RankedStory>,
    pub other_stories_count: usize,
    pub deduplication_summary: DeduplicationSummary,
}

/// Stage-two artifact, ready for human review and formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedStoriesFile {
    pub ranking_date: NaiveDate,
    pub date_range: DateRange,
    pub original_story_count: usize,
    #[serde(default)]
    pub deduplication_summary: DeduplicationSummary,
    #[serde(default)]
    pub top_stories: Vec<RankedStory>,
    #[serde(default)]
    pub secondary_stories: Vec<RankedStory>,
    #[serde(default)]
    pub launches: Vec<RankedStory>,
    #[serde(default)]
    pub other_stories_count: usize,
    #[serde(default)]
    pub notes: String,
}

impl RankedStoriesFile {
    pub fn from_ranking(
        result: RankingResult,
        date_range: DateRange,
        original_story_count: usize,
        ranking_date: NaiveDate,
    ) -> Self {
        Self {
            ranking_date,
            date_range,
            original_story_count,
            deduplication_summary: result.deduplication_summary,
            top_stories: result.top_stories,
            secondary_stories: result.secondary_stories,
            launches: result.launches,
            other_stories_count: result.other_stories_count,
            notes: "Deduplicated and ranked stories ready for human review".to_string(),
        }
    }
}
