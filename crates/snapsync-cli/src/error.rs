//! # Design
//!
//! - One error type covers every way a resync run can fail.
//! - Remote error bodies are kept verbatim so the cluster's reason reaches the log.
//! - Exit codes separate bad input from operational failures, nothing finer.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Exit code for rejected input, matching clap's usage-error code.
pub(crate) const EXIT_INVALID_INPUT: i32 = 2;
/// Exit code for any failure after input validation.
pub(crate) const EXIT_FAILURE: i32 = 1;

/// Result alias for resync operations.
pub(crate) type SyncResult<T> = Result<T, SyncError>;

/// Failures raised while validating input or talking to the cluster.
#[derive(Debug, Error)]
pub(crate) enum SyncError {
    /// Input failed validation before any request was made.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Name of the offending input.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The relationship lookup did not return 200.
    #[error("snapmirror relationship lookup failed with status {status}: {body}")]
    Lookup {
        /// Status returned by the cluster.
        status: StatusCode,
        /// Response body, parsed as JSON when possible.
        body: Value,
    },
    /// The state change was refused.
    #[error("snapmirror sync trigger failed with status {status}: {body}")]
    Trigger {
        /// Status returned by the cluster.
        status: StatusCode,
        /// Response body, parsed as JSON when possible.
        body: Value,
    },
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("{operation} request to {url} failed: {}", error_chain(.source))]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// A successful response carried a body that was not JSON.
    #[error("failed to parse {operation} response: {source}")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
}

/// Join an error and all of its causes with `: `.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut cause = error.source();
    while let Some(next) = cause {
        let message = next.to_string();
        if !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        cause = next.source();
    }
    rendered
}

impl SyncError {
    pub(crate) fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput { .. } => EXIT_INVALID_INPUT,
            Self::Lookup { .. }
            | Self::Trigger { .. }
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::ClientBuild { .. } => EXIT_FAILURE,
        }
    }
}
