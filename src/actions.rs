//! User actions: login, invites, SSO, password change.
//!
//! DESIGN
//! ======
//! Actions never return errors. Each one calls a collaborator, then reports
//! the outcome by dispatching into the reactor: request status transitions
//! for the tracked operation, plus `ReceiveUser` / `ReceiveInvite` payloads.
//! Follow-up effects (token storage, navigation) run only on success.
//!
//! `UserActions` is cheap to clone, so UI code can move a clone into a
//! spawned task and return immediately instead of awaiting.
//!
//! TRADE-OFFS
//! ==========
//! A tracked operation that is already in flight refuses a second start.
//! Double submits are dropped instead of racing, so a late response can
//! never overwrite the status of a newer attempt. An attempt whose future is
//! dropped before it settles is marked failed, so cancellation never leaves
//! the operation stuck in flight.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::{AuthConfig, AuthProviderType, REDIRECT_PARAM};
use crate::error::{self, AuthError, error_text};
use crate::invite::Invite;
use crate::reactor::{Event, Reactor};
use crate::services::storage::BearerToken;
use crate::services::{Api, AuthApi, History, Location, LoginResponse, Navigation, SessionApi, TokenStorage};
use crate::status::Operation;
use crate::user::UserPayload;

/// Everything the actions call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthApi>,
    pub session: Arc<dyn SessionApi>,
    pub api: Arc<dyn Api>,
    pub history: Arc<dyn History>,
    pub storage: Arc<dyn TokenStorage>,
}

/// Outcome of [`UserActions::ensure_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Valid,
    Redirected,
}

#[derive(Clone)]
pub struct UserActions {
    reactor: Reactor,
    config: AuthConfig,
    auth: Arc<dyn AuthApi>,
    session: Arc<dyn SessionApi>,
    api: Arc<dyn Api>,
    history: Arc<dyn History>,
    storage: Arc<dyn TokenStorage>,
}

impl UserActions {
    #[must_use]
    pub fn new(reactor: Reactor, config: AuthConfig, collaborators: Collaborators) -> Self {
        let Collaborators { auth, session, api, history, storage } = collaborators;
        Self { reactor, config, auth, session, api, history, storage }
    }

    #[must_use]
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    // =========================================================================
    // INVITES
    // =========================================================================

    /// Fetch invite details and publish them as `ReceiveInvite`.
    pub async fn fetch_invite(&self, invite_token: &str) {
        let request = async {
            let path = self.config.invite_path(invite_token)?;
            self.get_json::<Invite>(&path).await
        };
        self.settle(Operation::FetchingInvite, request, move |invite| async move {
            self.reactor.dispatch(Event::ReceiveInvite(invite));
            Ok(())
        })
        .await;
    }

    pub async fn accept_invite(&self, name: &str, password: &str, token: &str, invite_token: &str) {
        let request = self.auth.accept_invite(name, password, token, invite_token);
        self.settle(Operation::TryingToSignUp, request, move |()| self.open_app())
            .await;
    }

    pub async fn accept_invite_with_u2f(&self, name: &str, password: &str, invite_token: &str) {
        let request = self.auth.accept_invite_with_u2f(name, password, invite_token);
        self.settle(Operation::TryingToSignUp, request, move |()| self.open_app())
            .await;
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Check the current session before entering `target`.
    ///
    /// On an invalid session `redirect` receives the login location with the
    /// original target encoded as `redirect_uri`. `continuation` runs exactly
    /// once after the check settles, whatever the outcome.
    pub async fn ensure_user<R, C>(&self, target: &Location, redirect: R, continuation: C) -> SessionCheck
    where
        R: FnOnce(Location),
        C: FnOnce(),
    {
        let check = match self.session.ensure_session().await {
            Ok(()) => SessionCheck::Valid,
            Err(e) => {
                if !e.is_session_invalid() {
                    tracing::warn!(error = %e, "session check failed, treating as logged out");
                }
                let redirect_url = self.history.create_redirect(target);
                let search = format!("?{}", self.config.encode_query(&[(REDIRECT_PARAM, redirect_url.as_str())]));
                tracing::debug!(location = %target, "no session, redirecting to login");
                redirect(Location::new(self.config.login_route(), search));
                SessionCheck::Redirected
            }
        };
        continuation();
        check
    }

    /// Fetch the current user and publish it as `ReceiveUser`.
    pub async fn fetch_user(&self) {
        let request = self.get_json::<UserPayload>(self.config.user_context_path());
        self.settle(Operation::FetchingUser, request, move |user| async move {
            self.reactor.dispatch(Event::ReceiveUser(user));
            Ok(())
        })
        .await;
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Leave for the identity provider. Replaces the current history entry.
    pub fn login_with_sso(&self, provider_name: &str, provider_type: AuthProviderType) {
        let redirect = self.history.extract_redirect();
        let redirect = self.history.ensure_base_url(&redirect);
        let url = self.config.sso_url(&redirect, provider_name, provider_type);
        tracing::info!(provider = provider_name, %provider_type, "starting sso login");
        self.history.push(&url, Navigation::Replace);
    }

    pub async fn login_with_u2f(&self, user: &str, password: &str) {
        let request = self.auth.login_with_u2f(user, password);
        self.settle(Operation::TryingToLogin, request, move |response| self.complete_login(response))
            .await;
    }

    pub async fn login(&self, user: &str, password: &str, token: &str) {
        let request = self.auth.login(user, password, token);
        self.settle(Operation::TryingToLogin, request, move |response| self.complete_login(response))
            .await;
    }

    // =========================================================================
    // PASSWORD
    // =========================================================================

    pub async fn change_password_with_u2f(&self, old_password: &str, new_password: &str) {
        let request = self.auth.change_password_with_u2f(old_password, new_password);
        self.settle(Operation::TryingToChangePassword, request, |()| async { Ok(()) })
            .await;
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str, token: &str) {
        let request = self.auth.change_password(old_password, new_password, token);
        self.settle(Operation::TryingToChangePassword, request, |()| async { Ok(()) })
            .await;
    }

    /// Forget the last password change outcome. No request is made.
    pub fn reset_password_change_attempt(&self) {
        self.reactor
            .dispatch(Event::RequestCleared(Operation::TryingToChangePassword));
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    /// Drive `request` for `operation` and publish its status transitions.
    ///
    /// `on_success` runs with the response before the operation is marked
    /// succeeded; if it fails the operation is marked failed instead.
    async fn settle<T, F, S, SF>(&self, operation: Operation, request: F, on_success: S)
    where
        F: Future<Output = Result<T, AuthError>>,
        S: FnOnce(T) -> SF,
        SF: Future<Output = Result<(), AuthError>>,
    {
        if !self.reactor.begin_request(operation) {
            tracing::debug!(%operation, "already in flight, ignoring");
            return;
        }
        let pending = PendingRequest::new(&self.reactor, operation);

        let outcome = match request.await {
            Ok(value) => on_success(value).await,
            Err(e) => Err(e),
        };
        pending.finish(outcome);
    }

    async fn complete_login(&self, response: LoginResponse) -> Result<(), AuthError> {
        // Cookie sessions carry no token; only dev servers and the CLI need one.
        match BearerToken::from_login(&response) {
            Some(token) => self.storage.set_bearer_token(token).await?,
            None => tracing::debug!("login response carried no bearer token"),
        }
        let url = self.history.extract_redirect();
        tracing::info!(redirect = %url, "login succeeded");
        self.history.push(&url, Navigation::Replace);
        Ok(())
    }

    #[allow(clippy::unused_async)]
    async fn open_app(&self) -> Result<(), AuthError> {
        self.history
            .push(self.config.app_route(), Navigation::Replace);
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let value = self.api.get(path).await?;
        Ok(serde_json::from_value(value)?)
    }
}

// =============================================================================
// PENDING REQUEST
// =============================================================================

/// Status message for an operation whose future was dropped before it settled.
pub const CANCELLED_MESSAGE: &str = "request cancelled";

/// An operation marked in flight by `begin_request`.
///
/// Exactly one terminal status is dispatched: by `finish`, or on drop when
/// the owning future is cancelled mid-request.
struct PendingRequest<'a> {
    reactor: &'a Reactor,
    operation: Operation,
    settled: bool,
}

impl<'a> PendingRequest<'a> {
    fn new(reactor: &'a Reactor, operation: Operation) -> Self {
        Self { reactor, operation, settled: false }
    }

    fn finish(mut self, outcome: Result<(), AuthError>) {
        self.settled = true;
        let operation = self.operation;
        match outcome {
            Ok(()) => self.reactor.dispatch(Event::RequestSucceeded(operation)),
            Err(e) => {
                error::log_failure(operation, &e);
                self.reactor
                    .dispatch(Event::RequestFailed { operation, message: error_text(&e) });
            }
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(operation = %self.operation, "request dropped before it settled");
        self.reactor.dispatch(Event::RequestFailed {
            operation: self.operation,
            message: CANCELLED_MESSAGE.to_owned(),
        });
    }
}

#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;
