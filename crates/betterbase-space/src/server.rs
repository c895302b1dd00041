//! The space-lifecycle external collaborators: the server RPC surface, the
//! accounts directory, and local persistence. Membership log transport
//! itself is exposed via `betterbase_journal`'s CAS append, driven through
//! [`ServerApi::append_entry`]/[`ServerApi::list_entries`].

use async_trait::async_trait;
use betterbase_core::{Result, SpaceId};
use betterbase_journal::{AppendOutcome, LogEntry};
use serde_json::Value;

/// One invitation sitting in the server-side mailbox, still JWE-encrypted.
#[derive(Debug, Clone)]
pub struct ServerInvitation {
    pub id: String,
    pub ciphertext: Vec<u8>,
}

/// Server RPC surface a space manager drives: space creation, the
/// membership log, and invitation mailbox CRUD.
#[async_trait]
pub trait ServerApi: Send + Sync {
    async fn create_space(&self, root_public_key: &Value) -> Result<SpaceId>;

    async fn append_entry(&self, space_id: &SpaceId, entry: &LogEntry, expected_version: u64) -> Result<AppendOutcome>;

    async fn list_entries(&self, space_id: &SpaceId, since_seq: u64) -> Result<Vec<LogEntry>>;

    async fn revoke_ucan(&self, space_id: &SpaceId, cid: &str) -> Result<()>;

    async fn create_invitation(&self, mailbox_id: &str, ciphertext: Vec<u8>) -> Result<String>;

    async fn list_invitations(&self) -> Result<Vec<ServerInvitation>>;

    /// Best-effort cleanup; callers never fail a flow because this errors.
    async fn delete_invitation(&self, id: &str) -> Result<()>;
}

/// A recipient's public key and mailbox id, as looked up from the accounts
/// directory when building an invitation.
#[derive(Debug, Clone)]
pub struct RecipientInfo {
    pub public_key: Value,
    pub mailbox_id: String,
}

/// The accounts directory: resolves a handle to a recipient's public key
/// and mailbox. Implementations live outside this crate.
#[async_trait]
pub trait AccountsDirectory: Send + Sync {
    async fn lookup(&self, handle: &str) -> Result<RecipientInfo>;
}

/// Interface the space manager drives local persistence through — a
/// `__spaces`-style record store, not the document store
/// [`betterbase_core::SyncAdapter`] fronts.
#[async_trait]
pub trait SpaceStorage: Send + Sync {
    async fn save(&self, record: &crate::record::SpaceRecord) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<crate::record::SpaceRecord>>;

    async fn delete(&self, space_id: &SpaceId) -> Result<()>;
}
