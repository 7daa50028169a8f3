//! Current user record and its store reducer.

use serde::{Deserialize, Serialize};

use crate::reactor::Event;

/// How the current principal authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthType {
    Local,
    Sso,
    /// Any other tag, including a missing or empty one.
    Unknown(String),
}

impl AuthType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Sso => "sso",
            Self::Unknown(raw) => raw,
        }
    }
}

impl Default for AuthType {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<String> for AuthType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "local" => Self::Local,
            "sso" => Self::Sso,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<AuthType> for String {
    fn from(value: AuthType) -> Self {
        match value {
            AuthType::Unknown(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

/// User payload as delivered by the server. Missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserPayload {
    pub name: String,
    pub auth_type: AuthType,
}

/// Authenticated principal. Always fully formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    name: String,
    auth_type: AuthType,
}

impl User {
    #[must_use]
    pub fn new(name: impl Into<String>, auth_type: AuthType) -> Self {
        Self { name: name.into(), auth_type }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn auth_type(&self) -> &AuthType {
        &self.auth_type
    }

    #[must_use]
    pub fn is_sso(&self) -> bool {
        self.auth_type == AuthType::Sso
    }
}

impl From<UserPayload> for User {
    fn from(payload: UserPayload) -> Self {
        Self { name: payload.name, auth_type: payload.auth_type }
    }
}

/// Replace the current user wholesale with the received one.
#[allow(clippy::ref_option)]
pub(crate) fn receive_user(state: &Option<User>, event: &Event) -> Option<User> {
    match event {
        Event::ReceiveUser(payload) => Some(User::from(payload.clone())),
        _ => state.clone(),
    }
}

#[cfg(test)]
#[path = "user_test.rs"]
mod tests;
