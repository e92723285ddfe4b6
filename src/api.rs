//! LLM API interaction with exponential backoff retry logic.
//!
//! This module talks to the Anthropic Messages API. It includes automatic
//! retry logic with exponential backoff and jitter to handle transient
//! failures gracefully, and helpers for pulling a JSON object out of a
//! free-form model answer.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AnthropicClient`]: `reqwest` implementation against `/v1/messages`
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::ClaudeConfig;
use crate::error::ApiError;
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid fenced-json regex"));
static BRACED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid braced-json regex"));

/// A system prompt plus one user turn.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send a prompt to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send a prompt to the LLM and receive a response.
    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// ```ignore
    /// let client = AnthropicClient::new(http, api_key, claude_config);
    /// let retry_client = RetryAsk::new(client, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(prompt).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    config: ClaudeConfig,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: String, config: ClaudeConfig) -> Self {
        Self {
            http,
            api_key,
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

impl AskAsync for AnthropicClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.config.model))]
    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: &prompt.system,
            messages: [ChatMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis(),
                status = status.as_u16(),
                "API call failed"
            );
            return Err(Box::new(ApiError::Status {
                service: "anthropic",
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            }));
        }

        let parsed: MessagesResponse = resp.json().await?;
        if parsed.stop_reason.as_deref() == Some("max_tokens") {
            warn!(max_tokens = self.config.max_tokens, "Response hit max_tokens; output is truncated");
        }
        let text = parsed.text();
        if text.is_empty() {
            return Err(Box::new(ApiError::UnexpectedResponse {
                service: "anthropic",
                details: "no text content blocks".to_string(),
            }));
        }
        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            approx_tokens = text.len() / 4,
            "API call succeeded"
        );
        Ok(text)
    }
}

/// Pull the JSON object out of a model answer.
///
/// Prefers a fenced ```` ```json ```` block, then the widest `{...}` span,
/// and falls back to the whole text.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(inner) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    if let Some(braced) = BRACED_JSON.find(text) {
        return braced.as_str();
    }
    text
}

/// Call the LLM with exponential backoff retry logic.
///
/// Up to 5 retries, backing off 1s, 2s, 4s, 8s, 16s (capped at 30s) plus jitter.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff<T>(client: &T, prompt: &Prompt) -> Result<String, Box<dyn Error>>
where
    T: AskAsync<Response = String> + fmt::Debug,
{
    let t0 = Instant::now();
    let api = RetryAsk::new(client, 5, StdDuration::from_secs(1));
    let res = api.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(elapsed_ms_total = dt.as_millis(), "ask_with_backoff succeeded"),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis(), error = %e, "ask_with_backoff failed")
        }
    }
    res
}

/// Ask, extract the JSON block and deserialize it.
///
/// When parsing fails because the JSON ends early (a truncated answer), the
/// prompt is re-asked once. Returns the parsed value with the raw answer.
pub async fn ask_json<T, R>(client: &T, prompt: &Prompt) -> Result<(R, String), Box<dyn Error>>
where
    T: AskAsync<Response = String> + fmt::Debug,
    R: DeserializeOwned,
{
    let response = ask_with_backoff(client, prompt).await?;
    match serde_json::from_str::<R>(extract_json_block(&response)) {
        Ok(parsed) => Ok((parsed, response)),
        Err(e) if looks_truncated(&e) => {
            warn!(error = %e, "EOF while parsing; re-asking once");
            let retry = ask_with_backoff(client, prompt).await?;
            let parsed = serde_json::from_str::<R>(extract_json_block(&retry)).map_err(|e| {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&retry, 300),
                    "Model returned non-conforming JSON"
                );
                e
            })?;
            Ok((parsed, retry))
        }
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&response, 300),
                "Model returned non-conforming JSON"
            );
            Err(Box::new(e))
        }
    }
}

impl<T: AskAsync> AskAsync for &T {
    type Response = T::Response;

    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, Box<dyn Error>> {
        (**self).ask(prompt).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned answers in order; an `Err` entry simulates a failed call.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedAsk {
        pub answers: RefCell<VecDeque<Result<String, String>>>,
        pub prompts: RefCell<Vec<Prompt>>,
    }

    impl ScriptedAsk {
        pub(crate) fn new(answers: Vec<Result<&str, &str>>) -> Self {
            Self {
                answers: RefCell::new(
                    answers
                        .into_iter()
                        .map(|a| a.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AskAsync for ScriptedAsk {
        type Response = String;

        async fn ask(&self, prompt: &Prompt) -> Result<String, Box<dyn Error>> {
            self.prompts.borrow_mut().push(prompt.clone());
            match self.answers.borrow_mut().pop_front() {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(e)) => Err(e.into()),
                None => Err("script exhausted".into()),
            }
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "sys".to_string(),
            user: "user".to_string(),
        }
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"stories\": []}\n```\nThanks";
        assert_eq!(extract_json_block(text), "{\"stories\": []}");
    }

    #[test]
    fn test_extract_json_braced() {
        let text = "Sure! {\"a\": {\"b\": 1}} trailing";
        assert_eq!(extract_json_block(text), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_extract_json_fallback_whole_text() {
        assert_eq!(extract_json_block("no json here"), "no json here");
    }

    #[test]
    fn test_messages_response_text_concatenates_text_blocks() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text(), "Hello world");
    }

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 10,
            temperature: 0.5,
            system: "s",
            messages: [ChatMessage {
                role: "user",
                content: "u",
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "u");
        assert_eq!(value["system"], "s");
        assert_eq!(value["max_tokens"], 10);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let config = ClaudeConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let client = AnthropicClient::new(reqwest::Client::new(), "k".to_string(), config);
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryAsk::new(ScriptedAsk::default(), 5, StdDuration::from_secs(1));
        assert_eq!(retry.backoff(1), StdDuration::from_secs(1));
        assert_eq!(retry.backoff(2), StdDuration::from_secs(2));
        assert_eq!(retry.backoff(5), StdDuration::from_secs(16));
        assert_eq!(retry.backoff(6), StdDuration::from_secs(30));
        assert_eq!(retry.backoff(60), StdDuration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failure() {
        let inner = ScriptedAsk::new(vec![Err("boom"), Ok("fine")]);
        let retry = RetryAsk::new(&inner, 2, StdDuration::from_millis(1));
        assert_eq!(retry.ask(&prompt()).await.unwrap(), "fine");
        assert_eq!(inner.prompts.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let inner = ScriptedAsk::new(vec![Err("one"), Err("two")]);
        let retry = RetryAsk::new(&inner, 1, StdDuration::from_millis(1));
        let err = retry.ask(&prompt()).await.unwrap_err();
        assert_eq!(err.to_string(), "two");
    }

    #[tokio::test]
    async fn test_ask_json_reasks_on_truncation() {
        let inner = ScriptedAsk::new(vec![Ok("{\"stories\": ["), Ok("{\"stories\": []}")]);
        let (value, raw): (serde_json::Value, String) = ask_json(&inner, &prompt()).await.unwrap();
        assert_eq!(value["stories"], serde_json::json!([]));
        assert_eq!(raw, "{\"stories\": []}");
    }

    #[tokio::test]
    async fn test_ask_json_syntax_error_not_retried() {
        let inner = ScriptedAsk::new(vec![Ok("{\"stories\": nope}"), Ok("{}")]);
        let res: Result<(serde_json::Value, String), _> = ask_json(&inner, &prompt()).await;
        assert!(res.is_err());
        assert_eq!(inner.prompts.borrow().len(), 1);
    }
}
