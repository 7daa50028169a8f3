//! Client configuration: base URL, routes, API paths and URL builders.
//!
//! All URL builders are pure functions of their inputs. Query values are
//! percent-encoded through `reqwest::Url`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::AuthError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Query parameter carrying the post-login target.
pub const REDIRECT_PARAM: &str = "redirect_uri";

// =============================================================================
// API PATHS
// =============================================================================

pub const SESSION_PATH: &str = "/v1/webapi/sessions";
pub const SITES_PATH: &str = "/v1/webapi/sites";
pub const USER_CONTEXT_PATH: &str = "/v1/webapi/user/context";
pub const CREATE_USER_PATH: &str = "/v1/webapi/users";
pub const CHANGE_PASSWORD_PATH: &str = "/v1/webapi/users/password";
pub const U2F_SESSION_CHALLENGE_PATH: &str = "/v1/webapi/u2f/signrequest";
pub const U2F_SESSION_PATH: &str = "/v1/webapi/u2f/sessions";
pub const U2F_CREATE_USER_PATH: &str = "/v1/webapi/u2f/users";
pub const U2F_CHANGE_PASSWORD_CHALLENGE_PATH: &str = "/v1/webapi/u2f/password/changerequest";

const INVITE_PATH_PREFIX: &str = "/v1/webapi/users/invites";
const U2F_SIGNUP_CHALLENGE_PREFIX: &str = "/v1/webapi/u2f/signuptokens";

// =============================================================================
// PROVIDER TYPE
// =============================================================================

/// External identity provider protocol used for SSO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProviderType {
    Oidc,
    Saml,
    Github,
}

impl AuthProviderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oidc => "oidc",
            Self::Saml => "saml",
            Self::Github => "github",
        }
    }
}

impl fmt::Display for AuthProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProviderType {
    type Err = AuthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "oidc" => Ok(Self::Oidc),
            "saml" => Ok(Self::Saml),
            "github" => Ok(Self::Github),
            other => Err(AuthError::Config(format!("unknown auth provider type: {other}"))),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Client-side routes navigated to by the actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub app: String,
    pub login: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self { app: "/web".into(), login: "/web/login".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

impl Timeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    base_url: Url,
    pub routes: Routes,
    pub timeouts: Timeouts,
}

impl AuthConfig {
    /// Build a config rooted at `base_url` with default routes and timeouts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` unless `base_url` is an absolute http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let mut url =
            Url::parse(base_url.trim()).map_err(|e| AuthError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(AuthError::Config(format!("base url must be http(s): {base_url}")));
        }
        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { base_url: url, routes: Routes::default(), timeouts: Timeouts::default() })
    }

    /// Load from the environment.
    ///
    /// Required:
    /// - `AUTHFLOW_BASE_URL`
    ///
    /// Optional:
    /// - `AUTHFLOW_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTHFLOW_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the base URL is missing or invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url =
            std::env::var("AUTHFLOW_BASE_URL").map_err(|_| AuthError::Config("AUTHFLOW_BASE_URL not set".into()))?;
        let mut config = Self::new(&base_url)?;
        config.timeouts = Timeouts {
            request_secs: env_parse("AUTHFLOW_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTHFLOW_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    /// Base URL without trailing slash, e.g. `https://proxy.example.com`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Absolute URL for an API or route path.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    #[must_use]
    pub fn app_route(&self) -> &str {
        &self.routes.app
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.routes.login
    }

    /// Path of the invite resource for `invite_token`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` for an empty or dot-segment token.
    pub fn invite_path(&self, invite_token: &str) -> Result<String, AuthError> {
        self.token_path(INVITE_PATH_PREFIX, invite_token)
    }

    /// Path of the U2F registration challenge for `invite_token`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` for an empty or dot-segment token.
    pub fn u2f_signup_challenge_path(&self, invite_token: &str) -> Result<String, AuthError> {
        self.token_path(U2F_SIGNUP_CHALLENGE_PREFIX, invite_token)
    }

    /// Append `token` to `prefix` as exactly one percent-encoded segment.
    fn token_path(&self, prefix: &str, token: &str) -> Result<String, AuthError> {
        if matches!(token, "" | "." | "..") {
            return Err(AuthError::InvalidInput(format!("invalid token {token:?}")));
        }
        let mut url = self.url(prefix);
        url.path_segments_mut()
            .map_err(|()| AuthError::Config(format!("base url cannot carry a path: {}", self.base_url)))?
            .push(token);
        Ok(url.path().to_owned())
    }

    #[must_use]
    pub fn user_context_path(&self) -> &'static str {
        USER_CONTEXT_PATH
    }

    /// Absolute URL that starts an SSO login with `provider_name`.
    #[must_use]
    pub fn sso_url(&self, redirect: &str, provider_name: &str, provider_type: AuthProviderType) -> String {
        let path = match provider_type {
            AuthProviderType::Oidc => "/v1/webapi/oidc/login/web",
            AuthProviderType::Saml => "/v1/webapi/saml/sso",
            AuthProviderType::Github => "/v1/webapi/github/login/web",
        };
        let mut url = self.url(path);
        url.query_pairs_mut()
            .append_pair("redirect_url", redirect)
            .append_pair("connector_id", provider_name);
        url.to_string()
    }

    /// Percent-encode `pairs` as a query string (without the leading `?`).
    #[must_use]
    pub fn encode_query(&self, pairs: &[(&str, &str)]) -> String {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.query_pairs_mut().extend_pairs(pairs.iter().copied());
        url.query().unwrap_or_default().to_owned()
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
