//! Stage two: deduplicate, tag launches, rank and categorize raw stories.

use crate::api::{AskAsync, ask_with_backoff, extract_json_block};
use crate::config::Config;
use crate::models::{RankedStoriesFile, RankingResult, RawStoriesFile};
use crate::outputs::json::{DEBUG_JSON_FILE, DEBUG_RESPONSE_FILE, write_debug};
use crate::prompts::{WorkflowDocs, ranking_prompt};
use crate::utils::{looks_truncated, today, truncate_for_log};
use std::error::Error;
use std::fmt;
use std::path::Path;
use tracing::{error, info, instrument, warn};

/// Rank the stories in `raw`, saving the model's answer under `debug_dir`.
///
/// A response that is not valid JSON fails the stage: there is nothing
/// meaningful to hand to the formatting stage without a ranking.
#[instrument(level = "info", skip_all, fields(stories = raw.stories.len()))]
pub async fn rank_stories<C>(
    client: &C,
    raw: &RawStoriesFile,
    config: &Config,
    docs: &WorkflowDocs,
    debug_dir: &Path,
) -> Result<RankedStoriesFile, Box<dyn Error>>
where
    C: AskAsync<Response = String> + fmt::Debug,
{
    let original_count = raw.stories.len();
    if original_count == 0 {
        warn!("No raw stories to rank; producing an empty ranking");
        return Ok(RankedStoriesFile::from_ranking(
            RankingResult::default(),
            raw.date_range,
            0,
            today(),
        ));
    }

    let prompt = ranking_prompt(docs, &config.major_ai_companies, &raw.stories)?;
    info!(
        input_stories = original_count,
        approx_context_tokens = prompt.user.len() / 4,
        "Calling model for deduplication and ranking"
    );

    let mut result = ask_and_parse(client, &prompt, debug_dir).await;
    if matches!(result, Err(ParseFailure::Truncated(_))) {
        warn!("EOF while parsing ranking; re-asking once");
        result = ask_and_parse(client, &prompt, debug_dir).await;
    }

    let ranking = match result {
        Ok(ranking) => ranking,
        Err(ParseFailure::Call(e)) => return Err(e),
        Err(ParseFailure::Truncated(e)) | Err(ParseFailure::Invalid(e)) => {
            error!(error = %e, "Failed to parse ranking JSON");
            return Err(Box::new(e));
        }
    };

    let summary = ranking.deduplication_summary;
    info!(
        original = original_count,
        deduplicated = summary.deduplicated_story_count,
        merged = summary.stories_merged,
        top = ranking.top_stories.len(),
        secondary = ranking.secondary_stories.len(),
        launches = ranking.launches.len(),
        other = ranking.other_stories_count,
        "Deduplication and ranking complete"
    );

    Ok(RankedStoriesFile::from_ranking(
        ranking,
        raw.date_range,
        original_count,
        today(),
    ))
}

enum ParseFailure {
    Call(Box<dyn Error>),
    Truncated(serde_json::Error),
    Invalid(serde_json::Error),
}

async fn ask_and_parse<C>(client: &C, prompt: &crate::api::Prompt, debug_dir: &Path) -> Result<RankingResult, ParseFailure>
where
    C: AskAsync<Response = String> + fmt::Debug,
{
    let response = ask_with_backoff(client, prompt).await.map_err(ParseFailure::Call)?;
    info!(approx_tokens = response.len() / 4, "Received ranking response");
    if let Err(e) = write_debug(debug_dir, DEBUG_RESPONSE_FILE, &response).await {
        warn!(error = %e, "Could not save raw ranking response");
    }

    let json_text = extract_json_block(&response);
    if let Err(e) = write_debug(debug_dir, DEBUG_JSON_FILE, json_text).await {
        warn!(error = %e, "Could not save extracted ranking JSON");
    }

    serde_json::from_str::<RankingResult>(json_text).map_err(|e| {
        warn!(response_preview = %truncate_for_log(&response, 500), "Ranking response preview");
        if looks_truncated(&e) {
            ParseFailure::Truncated(e)
        } else {
            ParseFailure::Invalid(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedAsk;
    use crate::models::{DateRange, RawStory};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn raw(stories: Vec<RawStory>) -> RawStoriesFile {
        RawStoriesFile {
            extraction_date: date("2025-11-11"),
            date_range: DateRange {
                start: date("2025-11-03"),
                end: date("2025-11-10"),
            },
            newsletters_processed: 1,
            total_newsletters_found: 1,
            stories,
            notes: String::new(),
        }
    }

    fn debug_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("newsletter_digest_rank_{}_{}", std::process::id(), name))
    }

    fn story(headline: &str) -> RawStory {
        RawStory {
            headline: headline.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let client = ScriptedAsk::new(vec![]);
        let ranked = rank_stories(&client, &raw(vec![]), &Config::default(), &WorkflowDocs::default(), &debug_dir("empty"))
            .await
            .unwrap();
        assert!(ranked.top_stories.is_empty());
        assert!(client.prompts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_ranking_parsed_and_debug_saved() {
        let dir = debug_dir("ok");
        let answer = "Here is the ranking:\n```json\n{\"top_stories\": [{\"headline\": \"Merged\", \"sources\": [\"A\", \"B\"], \"mention_count\": 2}], \"other_stories_count\": 1, \"deduplication_summary\": {\"original_story_count\": 3, \"deduplicated_story_count\": 2, \"stories_merged\": 1}}\n```";
        let client = ScriptedAsk::new(vec![Ok(answer)]);
        let ranked = rank_stories(
            &client,
            &raw(vec![story("a"), story("b"), story("c")]),
            &Config::default(),
            &WorkflowDocs::default(),
            &dir,
        )
        .await
        .unwrap();

        assert_eq!(ranked.original_story_count, 3);
        assert_eq!(ranked.top_stories[0].headline, "Merged");
        assert_eq!(ranked.top_stories[0].mention_count, 2);
        assert_eq!(ranked.deduplication_summary.stories_merged, 1);
        assert_eq!(ranked.other_stories_count, 1);

        let saved = tokio::fs::read_to_string(dir.join(DEBUG_RESPONSE_FILE)).await.unwrap();
        assert_eq!(saved, answer);
        let saved_json = tokio::fs::read_to_string(dir.join(DEBUG_JSON_FILE)).await.unwrap();
        assert!(saved_json.starts_with("{\"top_stories\""));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_truncated_ranking_reasked_once() {
        let dir = debug_dir("truncated");
        let client = ScriptedAsk::new(vec![Ok("{\"top_stories\": ["), Ok("{\"launches\": []}")]);
        let ranked = rank_stories(&client, &raw(vec![story("a")]), &Config::default(), &WorkflowDocs::default(), &dir)
            .await
            .unwrap();
        assert!(ranked.launches.is_empty());
        assert_eq!(client.prompts.borrow().len(), 2);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_invalid_ranking_is_error() {
        let dir = debug_dir("invalid");
        let client = ScriptedAsk::new(vec![Ok("I could not rank these, sorry.")]);
        let res = rank_stories(&client, &raw(vec![story("a")]), &Config::default(), &WorkflowDocs::default(), &dir).await;
        assert!(res.is_err());
        assert_eq!(client.prompts.borrow().len(), 1);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
