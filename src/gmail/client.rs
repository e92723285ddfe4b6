//! Minimal Gmail REST v1 client: search, metadata and full-message fetches.

use crate::error::ApiError;
use crate::mime::{MessagePart, resolve_text};
use crate::models::{EmailSummary, Newsletter};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use tracing::{debug, info, instrument};
use url::Url;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail caps `maxResults` per list page at 500; the pipeline asks for 100.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListMessagesResponse {
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageRef {
    id: String,
}

/// A message resource. `payload` is absent only in minimal formats.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub payload: MessagePart,
}

impl Message {
    fn header(&self, name: &str) -> String {
        self.payload.header(name).unwrap_or_default().to_string()
    }

    /// Header summary of this message.
    pub fn summary(&self) -> EmailSummary {
        EmailSummary {
            id: self.id.clone(),
            from: self.header("From"),
            subject: self.header("Subject"),
            date: self.header("Date"),
        }
    }

    /// Headers plus the resolved plain-text body.
    pub fn into_newsletter(self) -> Newsletter {
        let EmailSummary {
            id,
            from,
            subject,
            date,
        } = self.summary();
        let text = resolve_text(&self.payload);
        Newsletter {
            id,
            from,
            subject,
            date,
            text,
        }
    }
}

/// Authenticated Gmail client for the `me` user.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            access_token,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    fn list_url(&self, query: &str, max_results: usize, page_token: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/messages", self.base_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("maxResults", &max_results.to_string());
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn message_url(&self, id: &str, format: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!(
            "{}/messages/{}",
            self.base_url,
            urlencoding::encode(id)
        ))?;
        url.query_pairs_mut().append_pair("format", format);
        if format == "metadata" {
            let mut pairs = url.query_pairs_mut();
            for header in ["From", "Subject", "Date"] {
                pairs.append_pair("metadataHeaders", header);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Box<dyn Error>> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Box::new(ApiError::Status {
                service: "gmail",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }));
        }
        Ok(resp.json::<T>().await?)
    }

    /// Search for messages matching a Gmail query, returning header summaries.
    #[instrument(level = "info", skip(self))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EmailSummary>, Box<dyn Error>> {
        let mut results = Vec::new();
        let mut page_token: Option<String> = None;

        while results.len() < max_results {
            let page_size = PAGE_SIZE.min(max_results - results.len());
            let url = self.list_url(query, page_size, page_token.as_deref())?;
            let page: ListMessagesResponse = self.get_json(url).await?;
            if page.messages.is_empty() {
                break;
            }

            for msg in page.messages.iter().take(max_results - results.len()) {
                let meta: Message = self.get_json(self.message_url(&msg.id, "metadata")?).await?;
                let summary = meta.summary();
                debug!(id = %summary.id, subject = %summary.subject, "Found message");
                results.push(summary);
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        info!(count = results.len(), "Gmail search complete");
        Ok(results)
    }

    /// Fetch one message in full and resolve its plain-text body.
    #[instrument(level = "info", skip(self))]
    pub async fn get_newsletter(&self, id: &str) -> Result<Newsletter, Box<dyn Error>> {
        let message: Message = self.get_json(self.message_url(id, "full")?).await?;
        let newsletter = message.into_newsletter();
        info!(chars = newsletter.text.chars().count(), "Resolved message text");
        Ok(newsletter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GmailClient {
        GmailClient::new(reqwest::Client::new(), "token".to_string())
    }

    #[test]
    fn test_list_url_encodes_query() {
        let url = client()
            .list_url("(from:a@b.com OR from:c@d.com) AND after:2025-11-03", 50, Some("next"))
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".into(), "(from:a@b.com OR from:c@d.com) AND after:2025-11-03".into()),
                ("maxResults".into(), "50".into()),
                ("pageToken".into(), "next".into()),
            ]
        );
        assert!(url.path().ends_with("/users/me/messages"));
    }

    #[test]
    fn test_metadata_url_requests_headers() {
        let url = client().message_url("18c0ffee", "metadata").unwrap();
        let headers: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "metadataHeaders")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(headers, vec!["From", "Subject", "Date"]);
        assert!(url.path().ends_with("/messages/18c0ffee"));
    }

    #[test]
    fn test_full_url_has_no_metadata_headers() {
        let url = client().message_url("abc", "full").unwrap();
        assert_eq!(url.query(), Some("format=full"));
    }

    #[test]
    fn test_message_into_newsletter() {
        let json = r#"{
            "id": "m1",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": "The Rundown <news@rundown.ai>"},
                    {"name": "Subject", "value": "OpenAI ships"},
                    {"name": "Date", "value": "Mon, 3 Nov 2025 10:00:00 +0000"}
                ],
                "body": {"data": "aGVsbG8", "size": 5}
            }
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        let newsletter = message.into_newsletter();
        assert_eq!(newsletter.id, "m1");
        assert_eq!(newsletter.from, "The Rundown <news@rundown.ai>");
        assert_eq!(newsletter.subject, "OpenAI ships");
        assert_eq!(newsletter.text, "hello");
    }

    #[test]
    fn test_list_response_without_messages() {
        let page: ListMessagesResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
