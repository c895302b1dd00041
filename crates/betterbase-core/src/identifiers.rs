//! Identity types shared across the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The DNS-style namespace used to derive deterministic personal space ids.
/// Fixed so that every client and server agree on the same v5 namespace.
const PERSONAL_SPACE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0xc1, 0x6d, 0x46, 0x6b, 0x84, 0x4c, 0x0a, 0x9b, 0x0e, 0x2e, 0x21, 0x4a, 0x33, 0x06, 0x50,
]);

/// Opaque tenant identifier ("space"). Wraps a string rather than a UUID
/// because personal spaces are derived values and shared spaces are
/// server-minted opaque ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(pub String);

impl SpaceId {
    /// Derive the deterministic personal space id for `issuer ∥ user ∥ client`.
    pub fn personal(issuer: &str, user: &str, client: &str) -> Self {
        let name = format!("{issuer}\u{0}{user}\u{0}{client}");
        let id = Uuid::new_v5(&PERSONAL_SPACE_NAMESPACE, name.as_bytes());
        Self(id.to_string())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SpaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SpaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity of a single CRDT record, scoped to a space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A `did:key` style identifier for a signer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(pub String);

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three roles a member of a space can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceRole {
    /// Can invite/remove members and rotate keys.
    Admin,
    /// Can push and pull records.
    Write,
    /// Can only pull records.
    Read,
}

impl SpaceRole {
    /// True if this role permits epoch rotation and membership management.
    pub fn is_admin(self) -> bool {
        matches!(self, SpaceRole::Admin)
    }
}

impl fmt::Display for SpaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpaceRole::Admin => "admin",
            SpaceRole::Write => "write",
            SpaceRole::Read => "read",
        };
        write!(f, "{s}")
    }
}
