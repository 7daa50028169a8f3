//! HTTP implementation of the auth, session and API collaborators.
//!
//! Talks to the proxy's `/v1/webapi` endpoints with `reqwest`. The cookie
//! store carries the server-set session; when a bearer token has been
//! stored it is attached as well, for servers that do not set cookies. An
//! expired token is cleared instead of sent.
//!
//! ERROR HANDLING
//! ==============
//! Non-success responses become `AuthError::Rejected` with the server's
//! message pulled out of the JSON body (`message` or `error.message`), or
//! the raw body when it is not JSON. 401/403 on the session check map to
//! `AuthError::SessionInvalid`.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use time::OffsetDateTime;

use super::{Api, AuthApi, LoginResponse, SessionApi, TokenStorage, U2fSigner};
use crate::config::{self, AuthConfig};
use crate::error::AuthError;

pub struct HttpClient {
    http: reqwest::Client,
    config: AuthConfig,
    storage: Arc<dyn TokenStorage>,
    u2f: Arc<dyn U2fSigner>,
}

impl HttpClient {
    /// Build a client with the configured timeouts and a cookie store.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the underlying HTTP client fails to build.
    pub fn new(config: AuthConfig, storage: Arc<dyn TokenStorage>, u2f: Arc<dyn U2fSigner>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .cookie_store(true)
            .build()
            .map_err(|e| AuthError::Config(format!("http client build failed: {e}")))?;
        Ok(Self { http, config, storage, u2f })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.config.url(path));
        match self.storage.bearer_token().await {
            Ok(Some(token)) if token.is_expired_at(OffsetDateTime::now_utc()) => {
                tracing::debug!(expired_at = ?token.expires_at(), "dropping expired bearer token");
                if let Err(e) = self.storage.clear_bearer_token().await {
                    tracing::warn!(error = %e, "failed to clear expired bearer token");
                }
                builder
            }
            Ok(Some(token)) => builder.header(reqwest::header::AUTHORIZATION, token.authorization()),
            Ok(None) => builder,
            Err(e) => {
                tracing::warn!(error = %e, "bearer token unavailable, sending without it");
                builder
            }
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, AuthError> {
        let mut builder = self.request(method.clone(), path).await;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(%method, %path, status = status.as_u16(), "webapi response");

        if !status.is_success() {
            return Err(AuthError::Rejected { status: status.as_u16(), message: rejection_message(status, &text) });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AuthError> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, AuthError> {
        self.send(Method::PUT, path, Some(body)).await
    }
}

/// Pull the human-readable message out of an error body.
pub(crate) fn rejection_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("message")
            .and_then(Value::as_str)
            .or_else(|| v.pointer("/error/message").and_then(Value::as_str))
            .map(str::to_owned)
    });
    let message = from_json.unwrap_or_else(|| body.trim().to_owned());
    if message.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| status.as_u16().to_string(), str::to_owned)
    } else {
        message
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpClient {
    async fn login(&self, user: &str, password: &str, token: &str) -> Result<LoginResponse, AuthError> {
        let body = json!({ "user": user, "pass": password, "second_factor_token": token });
        self.post(config::SESSION_PATH, &body).await
    }

    async fn login_with_u2f(&self, user: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let challenge = self
            .post(config::U2F_SESSION_CHALLENGE_PATH, &json!({ "user": user, "pass": password }))
            .await?;
        let signed = self.u2f.sign(&challenge).await?;
        let body = json!({ "user": user, "u2f_sign_response": signed });
        self.post(config::U2F_SESSION_PATH, &body).await
    }

    async fn accept_invite(&self, name: &str, password: &str, token: &str, invite_token: &str) -> Result<(), AuthError> {
        let body = json!({
            "invite_token": invite_token,
            "user": name,
            "pass": password,
            "second_factor_token": token,
        });
        self.post(config::CREATE_USER_PATH, &body).await?;
        Ok(())
    }

    async fn accept_invite_with_u2f(&self, name: &str, password: &str, invite_token: &str) -> Result<(), AuthError> {
        let challenge = self
            .send(Method::GET, &self.config.u2f_signup_challenge_path(invite_token)?, None)
            .await?;
        let registered = self.u2f.register(&challenge).await?;
        let body = json!({
            "invite_token": invite_token,
            "user": name,
            "pass": password,
            "u2f_register_response": registered,
        });
        self.post(config::U2F_CREATE_USER_PATH, &body).await?;
        Ok(())
    }

    async fn change_password(&self, old_password: &str, new_password: &str, token: &str) -> Result<(), AuthError> {
        let body = json!({
            "old_password": old_password,
            "new_password": new_password,
            "second_factor_token": token,
        });
        self.put(config::CHANGE_PASSWORD_PATH, &body).await?;
        Ok(())
    }

    async fn change_password_with_u2f(&self, old_password: &str, new_password: &str) -> Result<(), AuthError> {
        let challenge = self
            .post(config::U2F_CHANGE_PASSWORD_CHALLENGE_PATH, &json!({ "pass": old_password }))
            .await?;
        let signed = self.u2f.sign(&challenge).await?;
        let body = json!({
            "old_password": old_password,
            "new_password": new_password,
            "u2f_sign_response": signed,
        });
        self.put(config::CHANGE_PASSWORD_PATH, &body).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionApi for HttpClient {
    async fn ensure_session(&self) -> Result<(), AuthError> {
        match self.send(Method::GET, config::SITES_PATH, None).await {
            Ok(_) => Ok(()),
            Err(AuthError::Rejected { status: 401 | 403, .. }) => Err(AuthError::SessionInvalid),
            Err(e) => Err(e),
        }
    }

    async fn logout(&self) {
        if let Err(e) = self.send(Method::DELETE, config::SESSION_PATH, None).await {
            tracing::warn!(error = %e, "logout request failed");
        }
        if let Err(e) = self.storage.clear_bearer_token().await {
            tracing::warn!(error = %e, "failed to clear bearer token");
        }
    }
}

#[async_trait::async_trait]
impl Api for HttpClient {
    async fn get(&self, path: &str) -> Result<Value, AuthError> {
        self.send(Method::GET, path, None).await
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
