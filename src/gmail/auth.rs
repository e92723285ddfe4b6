//! Gmail OAuth credentials: loading a stored token and refreshing it.
//!
//! The token file uses the authorized-user layout written by Google's
//! client libraries (and by the Gmail MCP server):
//!
//! ```json
//! {"token": "...", "refresh_token": "...", "token_uri": "...",
//!  "client_id": "...", "client_secret": "...", "scopes": ["..."]}
//! ```
//!
//! No interactive consent flow is run here. A token file must already exist,
//! or an access token must be passed in directly.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Stored OAuth credentials for the Gmail API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoredCredentials {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl StoredCredentials {
    /// Whether enough is known to mint a fresh access token.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// Exchange the refresh token for a new access token, updating `self.token`.
    #[instrument(level = "info", skip_all)]
    pub async fn refresh(&mut self, http: &reqwest::Client) -> Result<(), Box<dyn Error>> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            self.refresh_token.as_deref(),
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        ) else {
            return Err(Box::new(ApiError::MissingCredentials(
                "refresh_token, client_id and client_secret are all required to refresh".into(),
            )));
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let resp = http.post(self.token_uri()).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Box::new(ApiError::Status {
                service: "oauth",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }));
        }

        let refreshed: RefreshResponse = resp.json().await?;
        info!(expires_in = ?refreshed.expires_in, "Refreshed Gmail access token");
        self.token = Some(refreshed.access_token);
        Ok(())
    }
}

/// Default location of the token file, `~/.gmail-mcp/gmail-token.json`.
pub fn default_token_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gmail-mcp").join("gmail-token.json"))
}

/// Read credentials from `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_credentials(path: &Path) -> Result<StoredCredentials, Box<dyn Error>> {
    if !path.exists() {
        return Err(Box::new(ApiError::MissingCredentials(format!(
            "token file not found: {}",
            path.display()
        ))));
    }
    let raw = fs::read_to_string(path).await?;
    let creds: StoredCredentials = serde_json::from_str(&raw)?;
    info!(can_refresh = creds.can_refresh(), "Loaded Gmail credentials");
    Ok(creds)
}

/// Produce a usable access token.
///
/// An explicit `override_token` wins. Otherwise the token file is loaded and,
/// when it carries refresh material, refreshed and written back.
#[instrument(level = "info", skip_all)]
pub async fn access_token(
    http: &reqwest::Client,
    override_token: Option<&str>,
    token_path: &Path,
) -> Result<String, Box<dyn Error>> {
    if let Some(token) = override_token.filter(|t| !t.trim().is_empty()) {
        info!("Using access token supplied on the command line / environment");
        return Ok(token.trim().to_string());
    }

    let mut creds = load_credentials(token_path).await?;
    if creds.can_refresh() {
        match creds.refresh(http).await {
            Ok(()) => {
                if let Err(e) = save_credentials(token_path, &creds).await {
                    warn!(error = %e, "Could not persist refreshed token");
                }
            }
            Err(e) => warn!(error = %e, "Token refresh failed; trying stored token"),
        }
    }

    creds.token.filter(|t| !t.is_empty()).ok_or_else(|| {
        Box::new(ApiError::MissingCredentials(format!(
            "no access token in {}",
            token_path.display()
        ))) as Box<dyn Error>
    })
}

async fn save_credentials(path: &Path, creds: &StoredCredentials) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(creds)?;
    fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("newsletter_digest_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_can_refresh_requires_all_fields() {
        let mut creds = StoredCredentials {
            refresh_token: Some("r".into()),
            client_id: Some("id".into()),
            ..Default::default()
        };
        assert!(!creds.can_refresh());
        creds.client_secret = Some("s".into());
        assert!(creds.can_refresh());
    }

    #[test]
    fn test_token_uri_default() {
        let creds = StoredCredentials::default();
        assert_eq!(creds.token_uri(), DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_parse_token_file_with_unknown_fields() {
        let json = r#"{"token": "abc", "scopes": ["https://www.googleapis.com/auth/gmail.readonly"], "expiry": "2025-11-10T00:00:00Z"}"#;
        let creds: StoredCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.token.as_deref(), Some("abc"));
        assert_eq!(creds.scopes.len(), 1);
        assert!(!creds.can_refresh());
    }

    #[tokio::test]
    async fn test_override_token_wins() {
        let http = reqwest::Client::new();
        let token = access_token(&http, Some(" tok "), Path::new("/nonexistent/token.json"))
            .await
            .unwrap();
        assert_eq!(token, "tok");
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let http = reqwest::Client::new();
        let err = access_token(&http, None, Path::new("/nonexistent/token.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("token file not found"));
    }

    #[tokio::test]
    async fn test_stored_token_used_without_refresh_material() {
        let path = temp_path("token.json");
        fs::write(&path, r#"{"token": "stored"}"#).await.unwrap();
        let http = reqwest::Client::new();
        let token = access_token(&http, None, &path).await.unwrap();
        assert_eq!(token, "stored");
        let _ = fs::remove_file(&path).await;
    }
}
