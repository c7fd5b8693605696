//! Session and principal schema types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role tag of the authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Front-desk registration
    Registrar,
    /// Consulting physician
    Doctor,
    /// Payment desk
    Cashier,
    /// Laboratory / ancillary services
    Lab,
    /// Specialist consultation views
    Specialist,
    /// System administration
    Admin,
}

/// The identity occupying the shared session slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Identity key; two principals are the same person iff this matches
    pub user_id: u64,

    /// Role tag driving which panels the client shows
    pub role: Role,

    /// Human-readable name for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Principal {
    /// Construct a principal with no extra display fields.
    pub fn new(user_id: u64, role: Role) -> Self {
        Self {
            user_id,
            role,
            display_name: None,
            unknown_fields: HashMap::new(),
        }
    }
}

/// The single "who is logged in" value.
///
/// Token and principal are set and cleared together; there is no state where
/// one outlives the other beyond a single notification cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque bearer token; absent when logged out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Authenticated identity; absent when logged out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
}

impl Session {
    /// A logged-out session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a principal currently occupies the slot.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.principal.is_some()
    }

    /// Identity key of the current principal, if any.
    pub fn user_id(&self) -> Option<u64> {
        self.principal.as_ref().map(|p| p.user_id)
    }
}
