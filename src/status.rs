//! Per-operation request status flags.
//!
//! DESIGN
//! ======
//! Each tracked operation moves `Idle -> InFlight -> Succeeded | Failed`.
//! `Idle` is reachable again only through an explicit clear. The status map
//! is a store like any other: it only changes when the reactor applies a
//! request event to it.

use std::collections::HashMap;
use std::fmt;

use crate::reactor::Event;

/// Named operations whose flight state is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchingInvite,
    FetchingUser,
    TryingToLogin,
    TryingToSignUp,
    TryingToChangePassword,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchingInvite => "fetching_invite",
            Self::FetchingUser => "fetching_user",
            Self::TryingToLogin => "trying_to_login",
            Self::TryingToSignUp => "trying_to_sign_up",
            Self::TryingToChangePassword => "trying_to_change_password",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flight state of a single operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestStatus {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

impl RequestStatus {
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Error message of a failed attempt.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Status of every tracked operation. Missing entries read as `Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatuses {
    entries: HashMap<Operation, RequestStatus>,
}

impl RequestStatuses {
    #[must_use]
    pub fn get(&self, operation: Operation) -> RequestStatus {
        self.entries.get(&operation).cloned().unwrap_or_default()
    }

    fn with(&self, operation: Operation, status: RequestStatus) -> Self {
        let mut next = self.clone();
        if status == RequestStatus::Idle {
            next.entries.remove(&operation);
        } else {
            next.entries.insert(operation, status);
        }
        next
    }
}

// =============================================================================
// REDUCERS
// =============================================================================

pub(crate) fn request_started(state: &RequestStatuses, event: &Event) -> RequestStatuses {
    match event {
        Event::RequestStarted(op) => state.with(*op, RequestStatus::InFlight),
        _ => state.clone(),
    }
}

pub(crate) fn request_succeeded(state: &RequestStatuses, event: &Event) -> RequestStatuses {
    match event {
        Event::RequestSucceeded(op) => state.with(*op, RequestStatus::Succeeded),
        _ => state.clone(),
    }
}

pub(crate) fn request_failed(state: &RequestStatuses, event: &Event) -> RequestStatuses {
    match event {
        Event::RequestFailed { operation, message } => state.with(*operation, RequestStatus::Failed(message.clone())),
        _ => state.clone(),
    }
}

pub(crate) fn request_cleared(state: &RequestStatuses, event: &Event) -> RequestStatuses {
    match event {
        Event::RequestCleared(op) => state.with(*op, RequestStatus::Idle),
        _ => state.clone(),
    }
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
