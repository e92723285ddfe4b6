//! Error types for the remote APIs the pipeline talks to.

use thiserror::Error;

/// Errors raised by the Gmail, OAuth and Anthropic clients.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// No usable credentials were found.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The response parsed but did not contain what we asked for.
    #[error("Unexpected {service} response: {details}")]
    UnexpectedResponse {
        service: &'static str,
        details: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let e = ApiError::Status {
            service: "gmail",
            status: 401,
            body: "invalid credentials".to_string(),
        };
        assert_eq!(e.to_string(), "gmail returned HTTP 401: invalid credentials");
    }

    #[test]
    fn test_missing_credentials_display() {
        let e = ApiError::MissingCredentials("no token file".to_string());
        assert_eq!(e.to_string(), "Missing credentials: no token file");
    }
}
