//! Fetched invite and its store reducer.
//!
//! The invite body is kept verbatim: known fields are typed, everything else
//! rides along in `extra` so nothing the server sent is dropped.

use serde::{Deserialize, Serialize};

use crate::reactor::Event;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    /// User name the invite was issued for.
    #[serde(default)]
    pub user: String,
    /// Base64 QR code for OTP enrolment, when the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_token: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[allow(clippy::ref_option)]
pub(crate) fn receive_invite(state: &Option<Invite>, event: &Event) -> Option<Invite> {
    match event {
        Event::ReceiveInvite(invite) => Some(invite.clone()),
        _ => state.clone(),
    }
}
