//! Reference documents and prompt construction for each LLM stage.
//!
//! The workflow, style guide and example documents are optional Markdown
//! files; a missing file is logged and treated as empty so the prompts still
//! work, just with less guidance.

use crate::api::Prompt;
use crate::config::DocsConfig;
use crate::models::{RankedStoriesFile, RawStory};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// The reference documents that steer every prompt.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDocs {
    pub workflow: String,
    pub style_guide: String,
    pub examples: String,
}

async fn read_optional(path: &Path) -> String {
    match fs::read_to_string(path).await {
        Ok(text) => {
            info!(path = %path.display(), bytes = text.len(), "Loaded reference document");
            text
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Reference document unavailable; continuing without it");
            String::new()
        }
    }
}

impl WorkflowDocs {
    pub async fn load(docs: &DocsConfig) -> Self {
        Self {
            workflow: read_optional(&docs.workflow).await,
            style_guide: read_optional(&docs.style_guide).await,
            examples: read_optional(&docs.examples).await,
        }
    }
}

/// Newsletter fields the extraction prompt needs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub source_name: &'a str,
    pub date: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
}

/// Stage one: pull every news story out of a single newsletter.
pub fn extraction_prompt(docs: &WorkflowDocs, input: ExtractionInput<'_>) -> Prompt {
    let system = format!(
        r#"You are an AI assistant helping to extract news stories from AI newsletters.

IMPORTANT WORKFLOW REFERENCE:
{workflow}

Your task for Step 1:
1. Read through the newsletter content carefully
2. Identify and extract ONLY actual news stories
3. News includes: new partnerships, products, features, fundraising, valuations, company announcements
4. SKIP: tips, tools, tutorials, prompts, how-to guides, opinion pieces, commentary, ads, sponsored content

For each news story you find, extract:
- headline: Clear, descriptive headline (use newsletter's or write your own)
- source: Newsletter name (use consistent naming)
- date: Newsletter date (YYYY-MM-DD format)
- summary: 1-3 sentence summary of what happened
- url: Link to the full story if provided (null if not available)

Output ONLY valid JSON in this exact format:
{{
  "stories": [
    {{
      "headline": "Story headline here",
      "source": "Newsletter name",
      "date": "YYYY-MM-DD",
      "summary": "Brief summary here",
      "url": "https://example.com or null"
    }}
  ]
}}

This is raw extraction - do NOT deduplicate or rank yet. Extract everything that qualifies as news."#,
        workflow = docs.workflow
    );

    let user = format!(
        "Extract all news stories from this newsletter:\n\n\
         Newsletter: {}\nDate: {}\nSubject: {}\n\nContent:\n{}\n\n\
         Extract all news stories and return them as JSON.",
        input.source_name, input.date, input.subject, input.text
    );

    Prompt { system, user }
}

/// Stage two: merge duplicates, tag launches, rank and bucket the stories.
pub fn ranking_prompt(
    docs: &WorkflowDocs,
    major_companies: &[String],
    stories: &[RawStory],
) -> Result<Prompt, Box<dyn Error>> {
    let count = stories.len();
    let system = format!(
        r#"You are an AI assistant helping to deduplicate and rank news stories for a weekly AI newsletter.

WORKFLOW REFERENCE:
{workflow}

STYLE GUIDE REFERENCE:
{style_guide}

EXAMPLE STORIES FOR REFERENCE:
{examples}

Your task is Step 2: Deduplication & Ranking.

You will receive {count} raw news stories extracted from newsletters. You must:

1. DEDUPLICATE:
   - Group overlapping stories that report on the same underlying event
   - When merging duplicates, keep:
     * Combined list of sources
     * Count of how many newsletters mentioned it
     * Whether it was a headline in any newsletter
     * A clean final headline
     * A unified summary (combining best information from all sources)
     * All URLs from different sources
     * The earliest date among the duplicates

2. TAG LAUNCHES:
   - Mark each story as "is_launch: true" if it's a launch (new model, company, product, feature, integration, partnership)
   - Keywords: launch, release, announce, unveil, introduce, debut, roll out, new model/product/feature/integration/partnership

3. RANK STORIES:
   Based on these criteria (in priority order):
   a) Whether multiple newsletters mentioned it
   b) Whether it appeared as a headline anywhere
   c) Whether it involves a major AI company: {companies}
   d) Whether it is truly significant (use judgment - big companies release minor things, small companies do amazing things)
   e) Whether a casual AI reader would need to know this to feel "caught up" for the week

4. CATEGORIZE:
   - Top 5 stories (most important)
   - Next 4-5 secondary stories
   - Launch list (all launches NOT in top 9-10 stories)
   - Other (everything else - just count, no details)

OUTPUT FORMAT (JSON):
{{
  "top_stories": [
    {{
      "headline": "Clean, compelling headline",
      "summary": "2-3 sentence summary of what happened",
      "sources": ["Newsletter 1", "Newsletter 2"],
      "mention_count": 2,
      "was_headline": true,
      "date": "YYYY-MM-DD",
      "urls": ["url1", "url2"],
      "is_launch": false,
      "involves_major_company": true,
      "companies_mentioned": ["OpenAI", "Google"]
    }}
  ],
  "secondary_stories": [ /* same format */ ],
  "launches": [ /* same format, all have is_launch: true */ ],
  "other_stories_count": 0,
  "deduplication_summary": {{
    "original_story_count": {count},
    "deduplicated_story_count": 0,
    "stories_merged": 0
  }}
}}

IMPORTANT:
- Be aggressive with deduplication - if stories cover the same event, merge them
- Use your judgment for ranking - follow the examples in the Newsletter Stories Example document
- For "other_stories_count", just provide the count - DO NOT list all other stories
- Output ONLY valid JSON, no other text
- We will add "why it matters" in a later step, focus on deduplication and ranking now"#,
        workflow = docs.workflow,
        style_guide = docs.style_guide,
        examples = docs.examples,
        companies = major_companies.join(", "),
    );

    let stories_json = serde_json::to_string_pretty(stories)?;
    let user = format!(
        "Here are the {count} raw news stories to deduplicate and rank:\n\n{stories_json}\n\n\
         Please deduplicate, tag launches, rank, and categorize these stories following the instructions.\n\
         Return your response as valid JSON only."
    );

    Ok(Prompt { system, user })
}

/// Stage three: write the publishable copy in the house style.
pub fn format_prompt(docs: &WorkflowDocs, ranked: &RankedStoriesFile) -> Result<Prompt, Box<dyn Error>> {
    let system = format!(
        r#"You are an AI assistant formatting newsletter copy.

Reference documents:
WORKFLOW: {workflow}
STYLE GUIDE: {style_guide}
EXAMPLES: {examples}

Your task is to format the provided stories following the exact style guide specifications:
- Top 5 stories: headline, summary, and a short "Why it matters" paragraph
- Secondary stories: emoji + headline + one-sentence summary
- Launches: a bullet list, one line each
Output Markdown only, with no preamble or closing remarks."#,
        workflow = docs.workflow,
        style_guide = docs.style_guide,
        examples = docs.examples,
    );

    let ranked_json = serde_json::to_string_pretty(ranked)?;
    let user = format!(
        "Format the ranked stories for the week of {} to {}:\n\n{ranked_json}",
        ranked.date_range.start, ranked.date_range.end
    );

    Ok(Prompt { system, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, RankingResult};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn docs() -> WorkflowDocs {
        WorkflowDocs {
            workflow: "WORKFLOW-DOC".to_string(),
            style_guide: "STYLE-DOC".to_string(),
            examples: "EXAMPLES-DOC".to_string(),
        }
    }

    #[test]
    fn test_extraction_prompt_contents() {
        let prompt = extraction_prompt(
            &docs(),
            ExtractionInput {
                source_name: "Axios AI+",
                date: "2025-11-04",
                subject: "AI+ weekly",
                text: "Body text",
            },
        );
        assert!(prompt.system.contains("WORKFLOW-DOC"));
        assert!(prompt.system.contains("\"stories\": ["));
        assert!(prompt.user.contains("Newsletter: Axios AI+"));
        assert!(prompt.user.contains("Date: 2025-11-04"));
        assert!(prompt.user.contains("Content:\nBody text"));
    }

    #[test]
    fn test_ranking_prompt_lists_companies_and_count() {
        let stories = vec![RawStory::default(), RawStory::default()];
        let companies = vec!["OpenAI".to_string(), "Anthropic".to_string()];
        let prompt = ranking_prompt(&docs(), &companies, &stories).unwrap();
        assert!(prompt.system.contains("major AI company: OpenAI, Anthropic"));
        assert!(prompt.system.contains("You will receive 2 raw news stories"));
        assert!(prompt.system.contains("\"original_story_count\": 2"));
        assert!(prompt.system.contains("STYLE-DOC"));
        assert!(prompt.user.starts_with("Here are the 2 raw news stories"));
    }

    #[test]
    fn test_format_prompt_includes_ranked_json() {
        let date = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let ranked = RankedStoriesFile::from_ranking(
            RankingResult::default(),
            DateRange {
                start: date("2025-11-03"),
                end: date("2025-11-10"),
            },
            0,
            date("2025-11-11"),
        );
        let prompt = format_prompt(&docs(), &ranked).unwrap();
        assert!(prompt.system.contains("EXAMPLES-DOC"));
        assert!(prompt.user.contains("2025-11-03 to 2025-11-10"));
        assert!(prompt.user.contains("\"top_stories\""));
    }

    #[tokio::test]
    async fn test_missing_docs_load_empty() {
        let loaded = WorkflowDocs::load(&DocsConfig {
            workflow: PathBuf::from("/nonexistent/workflow.md"),
            style_guide: PathBuf::from("/nonexistent/style.md"),
            examples: PathBuf::from("/nonexistent/examples.md"),
        })
        .await;
        assert!(loaded.workflow.is_empty());
        assert!(loaded.style_guide.is_empty());
        assert!(loaded.examples.is_empty());
    }
}
