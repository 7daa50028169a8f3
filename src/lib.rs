//! # authflow
//!
//! Authentication flow for the web client: login (password, OTP, U2F, SSO),
//! invite acceptance, password change, and the current-user store.
//!
//! Actions in [`actions`] call collaborators from [`services`] and report
//! every outcome by dispatching into the [`reactor::Reactor`], which feeds
//! the user, invite and request-status stores that UI layers read.

pub mod actions;
pub mod config;
pub mod error;
pub mod invite;
pub mod reactor;
pub mod services;
pub mod status;
pub mod user;

pub use actions::{Collaborators, SessionCheck, UserActions};
pub use config::{AuthConfig, AuthProviderType};
pub use error::{AuthError, error_text};
pub use reactor::{Event, Reactor};
pub use status::{Operation, RequestStatus};
pub use user::{AuthType, User};
