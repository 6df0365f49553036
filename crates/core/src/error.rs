//! Error taxonomy shared by every core operation.

use thiserror::Error;

/// Failure reasons surfaced to callers of the API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input detected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The backend rejected the credentials (HTTP 401). The session has
    /// already been cleared when this is returned.
    #[error("{message}")]
    Auth {
        /// Message extracted from the response.
        message: String,
    },

    /// Any other non-2xx response.
    #[error("{message}")]
    Request {
        /// HTTP status code of the response.
        status: u16,
        /// Server supplied message, or `HTTP <status>` when none was sent.
        message: String,
    },

    /// No response was received.
    #[error("could not reach the server, check your connection")]
    Network(#[source] reqwest::Error),

    /// The operation is not allowed in the contract's current state.
    #[error("{0}")]
    State(String),

    /// A success response whose body does not fit the expected schema.
    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),

    /// The local session could not be persisted.
    #[error("failed to store session: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl ApiError {
    /// HTTP status associated with the error, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { .. } => Some(401),
            ApiError::Request { status, .. } => Some(*status),
            ApiError::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Whether the caller should route the user back to login.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }
}

/// Result alias used throughout the core.
pub type ApiResult<T> = Result<T, ApiError>;
