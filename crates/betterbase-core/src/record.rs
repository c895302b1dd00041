//! The record shape the sync engine moves between the local document store
//! and the wire. The CRDT merge algorithm itself is an external collaborator
//! — this crate only describes the envelope the engine carries.

use crate::identifiers::{RecordId, SpaceId};
use serde::{Deserialize, Serialize};

/// A record as read from (or written to) the local document store via
/// [`crate::adapter::SyncAdapter`]. Identity is `(space_id, id)`; moving
/// a record between spaces is delete+recreate, never a field mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Record identity, unique within `space_id`.
    pub id: RecordId,
    /// Name of the collection the record belongs to.
    pub collection: String,
    /// Schema version understood by the adapter.
    pub schema_version: u64,
    /// Opaque CRDT payload bytes; never interpreted by the sync engine.
    pub crdt: Vec<u8>,
    /// Server-assigned strictly-increasing per-space sequence number.
    pub sequence: u64,
    /// Tombstone marker.
    pub deleted: bool,
    /// Space this record belongs to.
    pub space_id: SpaceId,
}

/// A change ready to be handed to the transport for encryption, or received
/// from the wire and ready for decryption. `blob` is `None` for tombstones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundChange {
    /// Record identity.
    pub id: RecordId,
    /// Encrypted envelope bytes, or `None` if the record is a tombstone.
    pub blob: Option<Vec<u8>>,
    /// Wrapped DEK bytes (44 bytes), present iff `blob` is present.
    pub wrapped_dek: Option<Vec<u8>>,
    /// The sequence the sender last observed for this record (for CAS-style
    /// conflict detection at the relay).
    pub expected_sequence: Option<u64>,
}

/// A change as received from the wire, prior to decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireChange {
    /// Record identity.
    pub id: RecordId,
    /// Encrypted envelope bytes, or `None` for a tombstone.
    pub blob: Option<Vec<u8>>,
    /// Wrapped DEK bytes, present iff `blob` is present.
    pub wrapped_dek: Option<Vec<u8>>,
    /// Server-assigned sequence number for this change.
    pub sequence: u64,
    /// Tombstone marker mirrored from the server.
    pub deleted: bool,
}

/// Metadata describing how a pulled record should be merged, attached by
/// [`crate::adapter::SyncAdapter::apply_remote_records`] callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecordMeta {
    /// Space the record arrived from, tagged by the router.
    pub space_id: Option<SpaceId>,
    /// Whether the embedded edit-chain validated during decryption.
    pub edit_chain_valid: Option<bool>,
    /// The CRDT view baked into this pull, used to baseline the next diff.
    pub last_server_view: Option<Vec<u8>>,
}

/// A decrypted record ready for `SyncAdapter::apply_remote_records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record identity.
    pub id: RecordId,
    /// Collection name taken from the decrypted envelope.
    pub collection: String,
    /// Schema version from the decrypted envelope.
    pub version: u64,
    /// Opaque CRDT payload, or empty for tombstones.
    pub crdt: Vec<u8>,
    /// Tombstone marker.
    pub deleted: bool,
    /// Server-assigned sequence number.
    pub sequence: u64,
    /// Engine-attached metadata.
    pub meta: RemoteRecordMeta,
}

/// A single non-retryable failure encountered while decrypting one pulled
/// record. Collected per-record rather than aborting the whole pull batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullFailure {
    /// Record identity that failed to decrypt.
    pub id: RecordId,
    /// Human-readable reason, taken from the underlying [`crate::error::SyncError`].
    pub reason: String,
}
