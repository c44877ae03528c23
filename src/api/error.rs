//! Closed error taxonomy for the generation client and orchestrator.
//!
//! Every failure the API layer can produce falls into one of these buckets
//! so the state controller can decide between the error panel and the
//! credential prompt without string matching at the call site.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or HTTP-level failure talking to the service.
    #[error("network error: {0}")]
    Transport(String),

    /// A required input was missing before any network call was made.
    #[error("{0}")]
    Precondition(String),

    /// The service answered successfully but produced no artifact.
    #[error("{0}")]
    EmptyResult(String),

    /// Invalid or missing credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Artifact fetch came back with a non-success status.
    #[error("failed to fetch artifact: HTTP {0}")]
    HttpStatus(u16),

    /// The job finished but the service reported a failure payload.
    #[error("generation failed: {0}")]
    Remote(String),

    /// The job never reached a terminal state within the polling budget.
    #[error("job still running after {0:?}; giving up")]
    Stalled(Duration),

    /// The polling loop was cancelled from the UI.
    #[error("cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}

/// Known markers the service uses for credential problems. 401/403 also
/// show up in the stringified transport error for bad keys.
fn looks_like_auth_failure(message: &str) -> bool {
    message.contains("401")
        || message.contains("403")
        || message.contains("API key")
        || message.contains("API_KEY")
        || message.contains("PERMISSION_DENIED")
}

impl From<ureq::Error> for ApiError {
    fn from(e: ureq::Error) -> Self {
        let message = e.to_string();
        if looks_like_auth_failure(&message) {
            ApiError::Auth(message)
        } else {
            ApiError::Transport(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_markers_are_detected() {
        assert!(looks_like_auth_failure("http status: 401"));
        assert!(looks_like_auth_failure("http status: 403"));
        assert!(looks_like_auth_failure("API key not valid"));
        assert!(!looks_like_auth_failure("connection refused"));
        assert!(!looks_like_auth_failure("http status: 500"));
    }

    #[test]
    fn is_auth_only_matches_auth() {
        assert!(ApiError::Auth("bad key".into()).is_auth());
        assert!(!ApiError::Transport("timeout".into()).is_auth());
        assert!(!ApiError::HttpStatus(403).is_auth());
    }
}
