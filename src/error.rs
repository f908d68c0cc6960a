//! Error types for TikTok Research API calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the research client.
///
/// None of these are retried. The caller decides whether the run ends.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// One or more credential environment variables are unset or empty.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    /// The token endpoint rejected the client key/secret.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested user (or resource) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API throttled the request.
    #[error("Rate limited by TikTok API: {0}")]
    RateLimit(String),

    /// Any other non-success answer from the API.
    #[error("TikTok API error ({status}, {code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("Request to TikTok API failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("Failed to decode TikTok API response: {0}")]
    Decode(String),
}

impl ExtractorError {
    /// Classify a failed research API answer.
    ///
    /// `code` and `message` come from the `error` object of the response
    /// envelope when the body had one.
    pub fn from_api(status: StatusCode, code: &str, message: &str) -> Self {
        let lowered = message.to_lowercase();

        if status == StatusCode::TOO_MANY_REQUESTS || code == "rate_limit_exceeded" {
            return Self::RateLimit(message.to_string());
        }

        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || code == "access_token_invalid"
            || code == "scope_not_authorized"
        {
            return Self::Auth(message.to_string());
        }

        if status == StatusCode::NOT_FOUND
            || code.contains("not_found")
            || lowered.contains("not found")
            || lowered.contains("not exist")
        {
            return Self::NotFound(message.to_string());
        }

        Self::Api {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}
