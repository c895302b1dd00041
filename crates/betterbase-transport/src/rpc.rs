//! Request/response payload shapes for every RPC method the realtime
//! connection exposes. Each corresponds to one `m` value on a [`crate::frame::Frame`].

use betterbase_core::{RecordId, SpaceId};
use serde::{Deserialize, Serialize};

/// `subscribe` — open a cursor on `space_id`/`collection` starting after
/// `since_sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub space_id: SpaceId,
    pub collection: String,
    pub since_sequence: u64,
}

/// `pull` — begin a chunked pull. The server replies with a `Chunk` stream
/// of [`PullRecordChunk`]/[`PullFileChunk`] frames terminated by
/// [`PullCommit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullBeginRequest {
    pub space_id: SpaceId,
    pub collection: String,
    pub since_sequence: u64,
    pub limit: u32,
}

/// One record delivered mid-pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRecordChunk {
    pub id: RecordId,
    #[serde(with = "serde_bytes")]
    pub blob: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub wrapped_dek: Vec<u8>,
    pub sequence: u64,
    pub deleted: bool,
}

/// One file-metadata reference delivered mid-pull, for collections that
/// carry file attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullFileChunk {
    pub file_id: String,
    pub record_id: RecordId,
    pub size: u64,
}

/// Terminates a pull, carrying the cursor the caller should persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullCommit {
    pub last_sequence: u64,
    pub has_more: bool,
}

/// `push` — upload a batch of outbound changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub space_id: SpaceId,
    pub collection: String,
    pub changes: Vec<PushChange>,
}

/// One change within a [`PushRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushChange {
    pub id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<serde_bytes::ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_dek: Option<serde_bytes::ByteBuf>,
    pub expected_sequence: Option<u64>,
}

/// Server reply to [`PushRequest`]: per-record acks and conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub accepted: Vec<RecordId>,
    pub conflicts: Vec<PushConflict>,
}

/// A single push conflict, carrying the server's authoritative sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConflict {
    pub id: RecordId,
    pub server_sequence: u64,
}

/// `membership.append` — append a signed entry to a space's membership log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipAppendRequest {
    pub space_id: SpaceId,
    pub expected_chain_seq: u64,
    #[serde(with = "serde_bytes")]
    pub entry_ciphertext: Vec<u8>,
    pub entry_hash: String,
    pub prev_hash: String,
}

/// `membership.list` — fetch the full log for local replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipListRequest {
    pub space_id: SpaceId,
    pub since_chain_seq: u64,
}

/// `membership.revoke` — admin-only revocation of a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRevokeRequest {
    pub space_id: SpaceId,
    pub member: String,
}

/// `epoch.begin` — start a three-phase epoch advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochBeginRequest {
    pub space_id: SpaceId,
    pub current_epoch: u32,
}

/// Server reply to `epoch.begin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochBeginResponse {
    pub rewrap_epoch: u32,
    /// `true` if another client's in-flight advance was adopted instead of
    /// a new one being started.
    pub adopted: bool,
}

/// `epoch.complete` — commit a finished rewrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochCompleteRequest {
    pub space_id: SpaceId,
    pub rewrap_epoch: u32,
}

/// `deks.get` / `file_deks.get` — fetch wrapped DEKs needing rewrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeksGetRequest {
    pub space_id: SpaceId,
    pub rewrap_epoch: u32,
}

/// `deks.rewrap` / `file_deks.rewrap` — submit rewrapped DEKs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeksRewrapRequest {
    pub space_id: SpaceId,
    pub rewrap_epoch: u32,
    pub entries: Vec<RewrappedDek>,
}

/// One rewrapped DEK submitted to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrappedDek {
    pub id: String,
    #[serde(with = "serde_bytes")]
    pub wrapped: Vec<u8>,
}

/// `invitation.create` — mint an invitation for a prospective member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationCreateRequest {
    pub space_id: SpaceId,
    pub invitee: String,
    pub role: betterbase_core::SpaceRole,
    pub ucan: String,
}

/// `invitation.list` — list pending invitations visible to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationListRequest {
    pub space_id: Option<SpaceId>,
}

/// `invitation.delete` — withdraw a pending invitation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationDeleteRequest {
    pub space_id: SpaceId,
    pub invitee: String,
}
