//! Backend error taxonomy.
//!
//! Each variant carries a fixed transient/permanent classification that the
//! retry wrapper consults. Transient errors are retried locally; everything
//! else propagates immediately.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Bad or missing configuration (credential, unknown backend). Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authentication rejected by the backend. Permanent.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The backend rejected the request as malformed. Permanent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backend refused to generate for this content. Permanent.
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// Throttling response from the backend. Transient.
    #[error("Throttled (HTTP {status}): {message}")]
    Throttled { status: u16, message: String },

    /// Server-side fault. Transient.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The call exceeded its bound. Transient.
    #[error("Backend call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Per-unit stream fault. Skipped unless the whole stream is empty.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The raw response matched none of the known extraction shapes.
    #[error("No recognizable content in backend response: {0}")]
    EmptyResponse(String),

    /// Terminal wrapper after the retry budget is spent.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<BackendError>,
    },
}

impl BackendError {
    /// Whether the retry wrapper may re-issue the call.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Throttled { .. }
            | BackendError::Server { .. }
            | BackendError::Timeout { .. } => true,
            BackendError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// HTTP status associated with this failure, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Throttled { status, .. } | BackendError::Server { status, .. } => {
                Some(*status)
            }
            BackendError::Http(err) => err.status().map(|s| s.as_u16()),
            BackendError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Classify a non-success HTTP response body into a taxonomy variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => BackendError::Auth(message),
            429 => BackendError::Throttled { status, message },
            400 | 404 | 422 => BackendError::InvalidRequest(message),
            s if s >= 500 => BackendError::Server { status, message },
            _ => BackendError::InvalidRequest(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Timeout { seconds: 60 }.is_transient());
        assert!(BackendError::Throttled { status: 429, message: String::new() }.is_transient());
        assert!(BackendError::Server { status: 503, message: String::new() }.is_transient());
        assert!(!BackendError::Auth("bad key".into()).is_transient());
        assert!(!BackendError::Configuration("missing key".into()).is_transient());
        assert!(!BackendError::EmptyResponse("{}".into()).is_transient());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            BackendError::from_status(401, "no".into()),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            BackendError::from_status(429, "slow down".into()),
            BackendError::Throttled { status: 429, .. }
        ));
        assert!(matches!(
            BackendError::from_status(500, "oops".into()),
            BackendError::Server { status: 500, .. }
        ));
        assert!(matches!(
            BackendError::from_status(400, "bad".into()),
            BackendError::InvalidRequest(_)
        ));
    }

    #[test]
    fn retries_exhausted_exposes_inner_status() {
        let err = BackendError::RetriesExhausted {
            attempts: 4,
            source: Box::new(BackendError::Server { status: 502, message: "bad gateway".into() }),
        };
        assert_eq!(err.status(), Some(502));
    }
}
