//! Stage one: fetch newsletters from Gmail and extract their news stories.

use crate::api::{AskAsync, ask_json};
use crate::config::Config;
use crate::gmail::build_query;
use crate::gmail::client::GmailClient;
use crate::models::{DateRange, ExtractionResponse, Newsletter, RawStoriesFile, RawStory};
use crate::prompts::{ExtractionInput, WorkflowDocs, extraction_prompt};
use crate::utils::{ascii_preview, parse_email_date, today};
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

/// Newsletters fetched for a window, plus how many the search found.
#[derive(Debug, Default)]
pub struct FetchedNewsletters {
    pub newsletters: Vec<Newsletter>,
    pub total_found: usize,
}

/// Search Gmail for the configured senders in `range` and fetch each hit.
///
/// Messages that fail to fetch are logged and skipped.
#[instrument(level = "info", skip_all, fields(start = %range.start, end = %range.end))]
pub async fn fetch_newsletters(
    gmail: &GmailClient,
    config: &Config,
    range: DateRange,
) -> Result<FetchedNewsletters, Box<dyn Error>> {
    let query = build_query(&config.newsletter_sources, range.start, range.end);
    info!(%query, "Searching Gmail");
    let found = gmail.search(&query, config.gmail.max_results).await?;
    let total_found = found.len();

    let newsletters: Vec<Newsletter> = stream::iter(found.into_iter().enumerate())
        .then(|(i, summary)| async move {
            info!(
                index = i + 1,
                total = total_found,
                subject = %ascii_preview(&summary.subject, 50),
                "Fetching newsletter"
            );
            match gmail.get_newsletter(&summary.id).await {
                Ok(newsletter) => Some(newsletter),
                Err(e) => {
                    error!(id = %summary.id, error = %e, "Failed to fetch email; skipping");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(fetched = newsletters.len(), found = total_found, "Fetched newsletters");
    Ok(FetchedNewsletters {
        newsletters,
        total_found,
    })
}

/// Ask the model for the stories in one newsletter.
///
/// Returns an empty list for newsletters with too little text to hold news.
#[instrument(level = "info", skip_all, fields(id = %newsletter.id))]
pub async fn extract_from_newsletter<C>(
    client: &C,
    newsletter: &Newsletter,
    config: &Config,
    docs: &WorkflowDocs,
) -> Result<Vec<RawStory>, Box<dyn Error>>
where
    C: AskAsync<Response = String> + fmt::Debug,
{
    let chars = newsletter.text.chars().count();
    if chars < config.min_text_chars {
        warn!(chars, min = config.min_text_chars, "No meaningful text content; skipping");
        return Ok(Vec::new());
    }

    let source_name = config.source_name(&newsletter.from);
    let date = parse_email_date(&newsletter.date, today()).to_string();
    info!(
        source = %source_name,
        %date,
        chars,
        approx_tokens = newsletter.estimated_tokens(),
        "Extracting stories"
    );

    let prompt = extraction_prompt(
        docs,
        ExtractionInput {
            source_name: &source_name,
            date: &date,
            subject: &newsletter.subject,
            text: &newsletter.text,
        },
    );
    let (response, _raw): (ExtractionResponse, String) = ask_json(client, &prompt).await?;
    let stories: Vec<RawStory> = response.stories.into_iter().map(RawStory::normalize).collect();
    info!(count = stories.len(), "Extracted stories");
    Ok(stories)
}

/// Extract stories from every newsletter, keeping newsletter order.
///
/// Up to `claude.parallelism` newsletters are in flight at once. A newsletter
/// whose extraction fails contributes no stories.
#[instrument(level = "info", skip_all, fields(newsletters = newsletters.len()))]
pub async fn extract_stories<C>(
    client: &C,
    newsletters: &[Newsletter],
    config: &Config,
    docs: &WorkflowDocs,
) -> Vec<RawStory>
where
    C: AskAsync<Response = String> + fmt::Debug,
{
    let total = newsletters.len();
    let per_newsletter: Vec<Vec<RawStory>> = stream::iter(newsletters.iter().enumerate())
        .map(|(i, newsletter)| async move {
            debug!(index = i + 1, total, "Queued newsletter for extraction");
            match extract_from_newsletter(client, newsletter, config, docs).await {
                Ok(stories) => stories,
                Err(e) => {
                    error!(
                        index = i + 1,
                        subject = %ascii_preview(&newsletter.subject, 50),
                        error = %e,
                        "Failed to extract stories; skipping newsletter"
                    );
                    Vec::new()
                }
            }
        })
        .buffered(config.claude.parallelism.max(1))
        .collect()
        .await;

    let stories: Vec<RawStory> = per_newsletter.into_iter().flatten().collect();
    info!(count = stories.len(), "Extracted stories from all newsletters");
    stories
}

/// Assemble the stage-one artifact.
pub fn raw_stories_file(
    range: DateRange,
    fetched: &FetchedNewsletters,
    stories: Vec<RawStory>,
) -> RawStoriesFile {
    RawStoriesFile {
        extraction_date: today(),
        date_range: range,
        newsletters_processed: fetched.newsletters.len(),
        total_newsletters_found: fetched.total_found,
        stories,
        notes: "Extraction from Gmail plain text via the Anthropic API".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedAsk;

    fn newsletter(from: &str, text: &str) -> Newsletter {
        Newsletter {
            id: "id".to_string(),
            from: from.to_string(),
            subject: "Weekly".to_string(),
            date: "Tue, 04 Nov 2025 09:00:00 +0000".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_short_newsletter_skipped_without_call() {
        let client = ScriptedAsk::new(vec![]);
        let stories = extract_from_newsletter(
            &client,
            &newsletter("a@axios.com", "too short"),
            &Config::default(),
            &WorkflowDocs::default(),
        )
        .await
        .unwrap();
        assert!(stories.is_empty());
        assert!(client.prompts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_extract_uses_source_name_and_date() {
        let client = ScriptedAsk::new(vec![Ok(
            "```json\n{\"stories\": [{\"headline\": \"H\", \"source\": \"Axios AI+\", \"date\": \"2025-11-04\", \"summary\": \"S\", \"url\": \"null\"}]}\n```",
        )]);
        let stories = extract_from_newsletter(
            &client,
            &newsletter("AI+ <ai.plus@axios.com>", &"x".repeat(200)),
            &Config::default(),
            &WorkflowDocs::default(),
        )
        .await
        .unwrap();

        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].headline, "H");
        assert_eq!(stories[0].url, None);
        let prompts = client.prompts.borrow();
        assert!(prompts[0].user.contains("Newsletter: Axios AI+"));
        assert!(prompts[0].user.contains("Date: 2025-11-04"));
    }

    #[tokio::test]
    async fn test_extract_stories_keeps_order_and_skips_failures() {
        let client = ScriptedAsk::new(vec![
            Ok(r#"{"stories": [{"headline": "first"}]}"#),
            Ok("not json at all"),
            Ok(r#"{"stories": [{"headline": "third-a"}, {"headline": "third-b"}]}"#),
        ]);
        let body = "y".repeat(150);
        let newsletters = vec![
            newsletter("a@techcrunch.com", &body),
            newsletter("b@rundown.ai", &body),
            newsletter("c@superhuman.ai", &body),
        ];
        let stories = extract_stories(&client, &newsletters, &Config::default(), &WorkflowDocs::default()).await;
        let headlines: Vec<&str> = stories.iter().map(|s| s.headline.as_str()).collect();
        assert_eq!(headlines, vec!["first", "third-a", "third-b"]);
    }

    #[test]
    fn test_raw_stories_file_counts() {
        let date = |s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let fetched = FetchedNewsletters {
            newsletters: vec![Newsletter::default()],
            total_found: 3,
        };
        let range = DateRange {
            start: date("2025-11-03"),
            end: date("2025-11-10"),
        };
        let file = raw_stories_file(range, &fetched, vec![RawStory::default()]);
        assert_eq!(file.newsletters_processed, 1);
        assert_eq!(file.total_newsletters_found, 3);
        assert_eq!(file.stories.len(), 1);
    }
}
