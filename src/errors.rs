use reqwest::StatusCode;
use std::fmt;

/// Message shown to the user when a poll request fails.
///
/// The underlying transport error is logged, not displayed.
pub const GENERIC_POLL_ERROR: &str = "Lost contact with the search service. Please try again.";

/// Client-side error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// No response from the backend (connect, timeout, TLS, body read).
    Network(String),
    /// The backend rejected the supplied identity.
    InvalidCredentials,
    /// The backend answered 401/403 for an authenticated call.
    Unauthorized(String),
    /// Input rejected before any request was issued.
    Validation(String),
    /// Resource not found.
    NotFound(String),
    /// The backend answered with a non-success status.
    Api {
        /// HTTP status returned by the backend.
        status: u16,
        /// Response body or `detail` field.
        message: String,
    },
    /// The backend reported the query as failed.
    JobFailed {
        /// The query that failed.
        query_id: String,
        /// Backend-supplied error message.
        message: String,
    },
    /// The poll loop gave up before the query reached a terminal status.
    PollTimeout {
        /// The query being polled.
        query_id: String,
        /// Seconds waited before giving up.
        waited_secs: u64,
    },
    /// The poll loop was cancelled by its owner.
    Aborted(String),
    /// Response body could not be decoded.
    Decode(String),
    /// Persisted session could not be read or written.
    Storage(String),
    /// Internal client error.
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::InvalidCredentials => write!(f, "Invalid credentials"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Api { status, message } => {
                write!(f, "Backend returned {}: {}", status, message)
            }
            AppError::JobFailed { query_id, message } => {
                write!(f, "Query {} failed: {}", query_id, message)
            }
            AppError::PollTimeout {
                query_id,
                waited_secs,
            } => write!(
                f,
                "Query {} did not finish within {}s; check its status later",
                query_id, waited_secs
            ),
            AppError::Aborted(query_id) => write!(f, "Polling for query {} was cancelled", query_id),
            AppError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            AppError::Storage(msg) => write!(f, "Session storage error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    /// Builds an error from a non-success response status and its body.
    ///
    /// FastAPI wraps messages as `{"detail": "..."}`; the detail is unwrapped
    /// when present so the user sees the backend's own wording.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                } else {
                    body.to_string()
                }
            });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            _ => AppError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Strips any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for transport failures where no response was received.
    pub fn is_network(&self) -> bool {
        matches!(self.root(), AppError::Network(_))
    }

    /// True for errors caused by rejected or missing credentials.
    pub fn is_auth(&self) -> bool {
        matches!(
            self.root(),
            AppError::InvalidCredentials | AppError::Unauthorized(_)
        )
    }

    /// Message suitable for showing to the user.
    ///
    /// Network and job-failure errors are shown verbatim; server-side
    /// failures are collapsed into a short generic sentence.
    pub fn user_message(&self) -> String {
        match self.root() {
            AppError::Api { status, .. } if *status >= 500 => {
                "The search service is having trouble right now.".to_string()
            }
            AppError::Internal(_) | AppError::Decode(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            AppError::from_status(status, "")
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for std::io::Error to add context
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unwraps_fastapi_detail() {
        let err = AppError::from_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail": "Failed to queue job"}"#,
        );
        match err {
            AppError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Failed to queue job");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_maps_auth_and_not_found() {
        assert!(AppError::from_status(StatusCode::UNAUTHORIZED, "").is_auth());
        assert!(AppError::from_status(StatusCode::FORBIDDEN, "nope").is_auth());
        assert!(matches!(
            AppError::from_status(StatusCode::NOT_FOUND, r#"{"detail":"Query not found"}"#),
            AppError::NotFound(ref m) if m == "Query not found"
        ));
    }

    #[test]
    fn test_empty_body_falls_back_to_reason() {
        let err = AppError::from_status(StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(err.to_string(), "Backend returned 502: Bad Gateway");
    }

    #[test]
    fn test_context_chain_keeps_root() {
        let err: Result<(), AppError> = Err(AppError::Network("connection refused".into()));
        let err = err.context("fetching leads").unwrap_err();

        assert!(err.is_network());
        assert_eq!(
            err.to_string(),
            "fetching leads: Network error: connection refused"
        );
    }

    #[test]
    fn test_user_message_hides_server_internals() {
        let err = AppError::Api {
            status: 500,
            message: "psycopg2.OperationalError".into(),
        };
        assert!(!err.user_message().contains("psycopg2"));

        let failed = AppError::JobFailed {
            query_id: "q1".into(),
            message: "No data sources responded".into(),
        };
        assert!(failed.user_message().contains("No data sources responded"));
    }
}
