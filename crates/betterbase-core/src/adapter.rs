//! The boundary to the local document store.
//!
//! The CRDT merge engine, indexing, query layer, and tombstone bookkeeping
//! are external collaborators — this crate only states the
//! interface the sync engine drives them through. Modeled as a trait object
//! rather than a closure-capturing callback stack.

use crate::error::Result;
use crate::identifiers::SpaceId;
use crate::record::{LocalRecord, RemoteRecord};
use async_trait::async_trait;

/// A definition of a syncable collection, as registered by the schema layer.
/// Only the fields the sync engine needs to route and diff records are
/// modeled here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    /// Collection name as it appears in the wire envelope's `c` field.
    pub name: String,
    /// Whether this collection carries a signed edit-chain.
    pub edit_chain_enabled: bool,
}

/// Interface the sync engine drives the local document store through.
///
/// Implementations live outside this crate: a real adapter wraps a
/// CRDT database, a test adapter is an in-memory map.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Collections registered with this adapter, in a stable order.
    fn collections(&self) -> Vec<CollectionDef>;

    /// Records in `collection` that have local writes not yet pushed.
    async fn get_dirty(&self, collection: &str, space_id: &SpaceId) -> Result<Vec<LocalRecord>>;

    /// Merge freshly-decrypted remote records into the local store.
    ///
    /// `collection` identifies which collection's merge logic to invoke;
    /// `server_seq` is the cursor value to persist once the merge commits.
    async fn apply_remote_records(
        &self,
        collection: &CollectionDef,
        records: Vec<RemoteRecord>,
        server_seq: u64,
    ) -> Result<()>;

    /// Mark local records as successfully synced (acks from a push).
    async fn mark_synced(&self, collection: &str, space_id: &SpaceId, ids: &[String]) -> Result<()>;

    /// Last sequence number the adapter has observed for `(collection, space)`.
    async fn get_last_sequence(&self, collection: &str, space_id: &SpaceId) -> Result<u64>;
}

/// Change-notification event delivered to [`Middleware::on_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A local write was observed.
    Local {
        /// Collection the change belongs to.
        collection: String,
        /// Space the change belongs to.
        space_id: SpaceId,
    },
    /// A remote write was merged in.
    Remote {
        /// Collection the change belongs to.
        collection: String,
        /// Space the change belongs to.
        space_id: SpaceId,
    },
}

/// Hook invoked around adapter operations. Modeled as a trait object so the
/// sync engine never captures ad hoc closures.
pub trait Middleware: Send + Sync {
    /// Called whenever the adapter reports a local or remote change.
    fn on_change(&self, event: &ChangeEvent);
}

/// A middleware that does nothing; the default when no observability hook
/// is configured.
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {
    fn on_change(&self, _event: &ChangeEvent) {}
}
