//! Collaborators the action layer talks to.
//!
//! ARCHITECTURE
//! ============
//! Every outside concern (auth API, session, generic API reads, navigation,
//! token storage, U2F device) sits behind a trait so actions can be driven
//! by the real HTTP client or by in-memory doubles. The async traits use
//! `async_trait` so they stay object safe behind `Arc<dyn ...>`.

pub mod history;
pub mod http;
pub mod storage;

#[cfg(test)]
pub mod test_helpers;

use std::fmt;

use crate::error::AuthError;
use storage::BearerToken;

/// Raw JSON body returned by a successful login.
pub type LoginResponse = serde_json::Value;

// =============================================================================
// AUTH / SESSION / API
// =============================================================================

#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, user: &str, password: &str, token: &str) -> Result<LoginResponse, AuthError>;

    async fn login_with_u2f(&self, user: &str, password: &str) -> Result<LoginResponse, AuthError>;

    async fn accept_invite(&self, name: &str, password: &str, token: &str, invite_token: &str) -> Result<(), AuthError>;

    async fn accept_invite_with_u2f(&self, name: &str, password: &str, invite_token: &str) -> Result<(), AuthError>;

    async fn change_password(&self, old_password: &str, new_password: &str, token: &str) -> Result<(), AuthError>;

    async fn change_password_with_u2f(&self, old_password: &str, new_password: &str) -> Result<(), AuthError>;
}

#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    /// Resolve if a valid session exists, `AuthError::SessionInvalid` otherwise.
    async fn ensure_session(&self) -> Result<(), AuthError>;

    /// Terminate the session. Cleanup and redirects are the implementor's job.
    async fn logout(&self);
}

#[async_trait::async_trait]
pub trait Api: Send + Sync {
    async fn get(&self, path: &str) -> Result<serde_json::Value, AuthError>;
}

// =============================================================================
// U2F
// =============================================================================

/// Hardware second factor. Challenges and responses are opaque U2F JSON.
#[async_trait::async_trait]
pub trait U2fSigner: Send + Sync {
    /// Answer a registration challenge (invite sign-up).
    async fn register(&self, challenge: &serde_json::Value) -> Result<serde_json::Value, AuthError>;

    /// Answer a sign challenge (login, password change).
    async fn sign(&self, challenge: &serde_json::Value) -> Result<serde_json::Value, AuthError>;
}

/// Signer used when no device is attached; every challenge fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoU2fDevice;

#[async_trait::async_trait]
impl U2fSigner for NoU2fDevice {
    async fn register(&self, _challenge: &serde_json::Value) -> Result<serde_json::Value, AuthError> {
        Err(AuthError::U2f("no u2f device available".into()))
    }

    async fn sign(&self, _challenge: &serde_json::Value) -> Result<serde_json::Value, AuthError> {
        Err(AuthError::U2f("no u2f device available".into()))
    }
}

// =============================================================================
// STORAGE
// =============================================================================

#[async_trait::async_trait]
pub trait TokenStorage: Send + Sync {
    /// Take ownership of `token` as the persisted credential.
    async fn set_bearer_token(&self, token: BearerToken) -> Result<(), AuthError>;

    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError>;

    async fn clear_bearer_token(&self) -> Result<(), AuthError>;
}

// =============================================================================
// NAVIGATION
// =============================================================================

/// Whether a navigation creates a back-navigable history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Push,
    Replace,
}

/// Path plus query string of a client location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
}

impl Location {
    #[must_use]
    pub fn new(pathname: impl Into<String>, search: impl Into<String>) -> Self {
        Self { pathname: pathname.into(), search: search.into() }
    }

    /// Split `url` at the first `?`. Fragments are dropped.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let url = url.split('#').next().unwrap_or_default();
        match url.split_once('?') {
            Some((path, query)) => Self::new(path, format!("?{query}")),
            None => Self::new(url, ""),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pathname, self.search)
    }
}

pub trait History: Send + Sync {
    fn push(&self, url: &str, navigation: Navigation);

    /// Post-login target captured in the current location, or the app route.
    fn extract_redirect(&self) -> String;

    /// Prefix the base URL unless `url` already carries it.
    fn ensure_base_url(&self, url: &str) -> String;

    /// Absolute redirect target for `location`.
    fn create_redirect(&self, location: &Location) -> String;
}
