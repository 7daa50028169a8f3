//! Bearer-token persistence.
//!
//! The token matters only for clients that cannot rely on the server-set
//! session cookie (dev servers, the CLI). Browsers keep using cookies.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use super::TokenStorage;
use crate::error::AuthError;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Credential built from a login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds from `created`; 0 when the server gave none.
    pub expires_in: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[derive(Deserialize)]
struct LoginTokenFields {
    token: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(default, rename = "type")]
    token_type: Option<String>,
}

impl BearerToken {
    /// Build from the raw login JSON. `None` when the response carries no
    /// token, which is the case for cookie-only sessions.
    #[must_use]
    pub fn from_login(response: &serde_json::Value) -> Option<Self> {
        let fields = LoginTokenFields::deserialize(response).ok()?;
        if fields.token.is_empty() {
            return None;
        }
        Some(Self {
            access_token: fields.token,
            token_type: fields
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned()),
            expires_in: fields.expires_in,
            created: OffsetDateTime::now_utc(),
        })
    }

    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        let secs = i64::try_from(self.expires_in).unwrap_or(i64::MAX);
        self.created.saturating_add(time::Duration::seconds(secs))
    }

    /// A token without a lifetime (`expires_in == 0`) never expires locally.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_in != 0 && self.expires_at() <= now
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<BearerToken>>,
}

impl MemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn set_bearer_token(&self, token: BearerToken) -> Result<(), AuthError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        Ok(self.token.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn clear_bearer_token(&self) -> Result<(), AuthError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// Token kept as pretty JSON in a single owner-only file, replaced
/// atomically on every write.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the token is written to before it replaces `path`.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Write `body` to a fresh file readable only by the owner.
async fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

fn storage_err(path: &Path, err: impl std::fmt::Display) -> AuthError {
    AuthError::Storage(format!("{}: {err}", path.display()))
}

#[async_trait::async_trait]
impl TokenStorage for FileTokenStorage {
    async fn set_bearer_token(&self, token: BearerToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(&token).map_err(|e| storage_err(&self.path, e))?;
        let staging = self.staging_path();
        write_private(&staging, &body)
            .await
            .map_err(|e| storage_err(&staging, e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| storage_err(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "bearer token stored");
        Ok(())
    }

    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(&self.path, e)),
        };
        let token = serde_json::from_slice(&body).map_err(|e| storage_err(&self.path, e))?;
        Ok(Some(token))
    }

    async fn clear_bearer_token(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(&self.path, e)),
        }
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
