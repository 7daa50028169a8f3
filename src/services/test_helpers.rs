//! In-memory collaborator doubles for action tests.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::Semaphore;

use super::{Api, AuthApi, History, Location, LoginResponse, Navigation, SessionApi};
use crate::error::AuthError;

pub const BASE_URL: &str = "https://proxy.example.com";

/// Auth API returning a scripted outcome and recording each call.
pub struct MockAuth {
    outcome: Mutex<Result<LoginResponse, AuthError>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockAuth {
    pub fn ok() -> Self {
        Self::with(Ok(json!({ "type": "bearer", "token": "tok-1", "expires_in": 600 })))
    }

    pub fn rejecting(message: &str) -> Self {
        Self::with(Err(AuthError::Rejected { status: 403, message: message.into() }))
    }

    pub fn with(outcome: Result<LoginResponse, AuthError>) -> Self {
        Self { outcome: Mutex::new(outcome), calls: Mutex::new(Vec::new()), gate: None }
    }

    /// Hold every call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn call(&self, name: &str) -> Result<LoginResponse, AuthError> {
        self.calls.lock().unwrap().push(name.to_owned());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.outcome.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuthApi for MockAuth {
    async fn login(&self, _user: &str, _password: &str, _token: &str) -> Result<LoginResponse, AuthError> {
        self.call("login").await
    }

    async fn login_with_u2f(&self, _user: &str, _password: &str) -> Result<LoginResponse, AuthError> {
        self.call("login_with_u2f").await
    }

    async fn accept_invite(&self, _name: &str, _password: &str, _token: &str, _invite: &str) -> Result<(), AuthError> {
        self.call("accept_invite").await.map(|_| ())
    }

    async fn accept_invite_with_u2f(&self, _name: &str, _password: &str, _invite: &str) -> Result<(), AuthError> {
        self.call("accept_invite_with_u2f").await.map(|_| ())
    }

    async fn change_password(&self, _old: &str, _new: &str, _token: &str) -> Result<(), AuthError> {
        self.call("change_password").await.map(|_| ())
    }

    async fn change_password_with_u2f(&self, _old: &str, _new: &str) -> Result<(), AuthError> {
        self.call("change_password_with_u2f").await.map(|_| ())
    }
}

/// Session double with a scripted check outcome.
pub struct MockSession {
    outcome: Result<(), AuthError>,
    logouts: Mutex<usize>,
}

impl MockSession {
    pub fn new(valid: bool) -> Self {
        Self::with_outcome(if valid { Ok(()) } else { Err(AuthError::SessionInvalid) })
    }

    pub fn with_outcome(outcome: Result<(), AuthError>) -> Self {
        Self { outcome, logouts: Mutex::new(0) }
    }

    pub fn logouts(&self) -> usize {
        *self.logouts.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl SessionApi for MockSession {
    async fn ensure_session(&self) -> Result<(), AuthError> {
        self.outcome.clone()
    }

    async fn logout(&self) {
        *self.logouts.lock().unwrap() += 1;
    }
}

/// API double serving one scripted response for every path.
pub struct MockApi {
    outcome: Result<Value, AuthError>,
    paths: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new(outcome: Result<Value, AuthError>) -> Self {
        Self { outcome, paths: Mutex::new(Vec::new()) }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Api for MockApi {
    async fn get(&self, path: &str) -> Result<Value, AuthError> {
        self.paths.lock().unwrap().push(path.to_owned());
        self.outcome.clone()
    }
}

/// History double recording every navigation.
pub struct RecordingHistory {
    redirect: String,
    pushes: Mutex<Vec<(String, Navigation)>>,
}

impl RecordingHistory {
    pub fn new(redirect: &str) -> Self {
        Self { redirect: redirect.to_owned(), pushes: Mutex::new(Vec::new()) }
    }

    pub fn pushes(&self) -> Vec<(String, Navigation)> {
        self.pushes.lock().unwrap().clone()
    }
}

impl History for RecordingHistory {
    fn push(&self, url: &str, navigation: Navigation) {
        self.pushes.lock().unwrap().push((url.to_owned(), navigation));
    }

    fn extract_redirect(&self) -> String {
        self.redirect.clone()
    }

    fn ensure_base_url(&self, url: &str) -> String {
        if url.starts_with(BASE_URL) { url.to_owned() } else { format!("{BASE_URL}{url}") }
    }

    fn create_redirect(&self, location: &Location) -> String {
        self.ensure_base_url(&location.to_string())
    }
}
