//! Errors produced by auth collaborators.
//!
//! ERROR HANDLING
//! ==============
//! Collaborators return `AuthError`; the action layer never propagates it.
//! Every failure is converted to display text with [`error_text`] and lands
//! in the failed state of the matching request status.

use crate::status::Operation;

/// Fallback display text when an error carries no usable message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The request never produced an HTTP response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No valid session exists. Drives a login redirect, not an error display.
    #[error("session is not valid")]
    SessionInvalid,

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The second-factor device failed or is not available.
    #[error("u2f device error: {0}")]
    U2f(String),

    /// The bearer token could not be persisted or read back.
    #[error("token storage error: {0}")]
    Storage(String),

    /// A caller-supplied value cannot be sent as given.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is missing or malformed.
    #[error("config error: {0}")]
    Config(String),
}

impl AuthError {
    /// True for the expected "no session" branch.
    #[must_use]
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Extract the human-readable message shown next to a failed request.
///
/// Server rejections show the server's own message; everything else shows
/// the error's display form. The result is never empty.
#[must_use]
pub fn error_text(err: &AuthError) -> String {
    let text = match err {
        AuthError::Rejected { status, message } => {
            if message.trim().is_empty() {
                format!("request failed with status {status}")
            } else {
                message.clone()
            }
        }
        other => other.to_string(),
    };
    if text.trim().is_empty() { UNKNOWN_ERROR.to_owned() } else { text }
}

/// Log a failed operation with its tag. Session checks are not errors.
pub(crate) fn log_failure(operation: Operation, err: &AuthError) {
    if err.is_session_invalid() {
        tracing::debug!(%operation, "session invalid");
    } else {
        tracing::error!(%operation, error = %err, "auth request failed");
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
