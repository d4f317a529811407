//! Error taxonomy for the admin client core.
//!
//! Three families: `ApiError` for anything that happens between us and the
//! dashboard, `ActionError` for dispatcher actions that failed after their
//! rollback completed, and `StorageError` for the local overlay cache.

use thiserror::Error;

/// Errors from the remote order store.
#[derive(Debug, Error)]
pub enum ApiError {
    /// TCP/TLS level failure before any response arrived.
    #[error("cannot reach dashboard at {url}")]
    Connect { url: String },

    /// The request exceeded the client timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Non-success HTTP status. `message` carries the server-provided text
    /// when the body had one, or a generic description otherwise.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// The response body could not be decoded into what we expected.
    #[error("invalid response from dashboard: {0}")]
    BadPayload(String),

    /// Any other transport-level failure.
    #[error("network error: {0}")]
    Network(String),
}

impl ApiError {
    /// Whether a retry could plausibly succeed: timeouts, connection
    /// failures and 5xx qualify; 4xx and decode failures are terminal.
    pub fn is_retriable(&self) -> bool {
        match self {
            ApiError::Connect { .. } | ApiError::Timeout { .. } | ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::BadPayload(_) => false,
        }
    }

    /// Map a `reqwest::Error` onto the taxonomy, keeping the target URL for
    /// the user-facing message.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            ApiError::Connect {
                url: url.to_string(),
            }
        } else {
            ApiError::Network(format!("{url}: {err}"))
        }
    }
}

/// A dispatcher action that reached its terminal failure state. By the time
/// one of these is returned the optimistic mutation has been rolled back.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{action} failed for order {order_id}: {source}")]
    Rejected {
        action: &'static str,
        order_id: String,
        #[source]
        source: ApiError,
    },

    #[error("{action} failed: {source}")]
    RejectedBulk {
        action: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("invalid order: {reason}")]
    Invalid { reason: String },
}

impl ActionError {
    pub(crate) fn rejected(action: &'static str, order_id: &str, source: ApiError) -> Self {
        ActionError::Rejected {
            action,
            order_id: order_id.to_string(),
            source,
        }
    }
}

/// Local overlay cache failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache setup: {0}")]
    Setup(String),
}
