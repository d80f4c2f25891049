use thiserror::Error;

/// Errors from a live event stream, after the request itself succeeded.
///
/// Cancellation is deliberately not represented here: a cancelled stream
/// simply stops emitting. Only genuine transport failures reach the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Transport error: {details}")]
    Transport { details: String },
}

impl StreamError {
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport {
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed: {details}")]
    AuthenticationFailed { details: String },

    #[error("Rate limited by agent: {details}")]
    RateLimited { details: String },

    #[error("Invalid request: {details}")]
    InvalidRequest { details: String },

    #[error("Agent server error (Status: {status_code}): {details}")]
    ServerError { status_code: u16, details: String },

    #[error("Failed to parse agent response: {details}")]
    ResponseParsingError { details: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Map a non-success HTTP status and its body to the matching error.
    pub(crate) fn from_status(status_code: u16, details: String) -> Self {
        match status_code {
            401 | 403 => ApiError::AuthenticationFailed { details },
            429 => ApiError::RateLimited { details },
            400..=499 => ApiError::InvalidRequest { details },
            _ => ApiError::ServerError {
                status_code,
                details,
            },
        }
    }
}
