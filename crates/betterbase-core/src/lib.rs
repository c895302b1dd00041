//! # Betterbase Core - Foundation types
//!
//! **Purpose**: single source of truth for the identifiers, error taxonomy,
//! record shapes, and external-collaborator interfaces shared by every
//! other crate in the sync engine. Contains no transport, crypto, or
//! protocol logic of its own.
//!
//! # Architecture Constraints
//!
//! - Zero dependencies on other `betterbase-*` crates (foundation layer).
//! - No network I/O, no cryptography, no storage: those are implemented in
//!   `betterbase-crypto`, `betterbase-transport`, and `betterbase-filestore`.
#![forbid(unsafe_code)]

/// Boundary traits to the local document store (`SyncAdapter`, `Middleware`).
pub mod adapter;
/// Unified error type and retry-classification taxonomy.
pub mod error;
/// Space/record/signer identifiers.
pub mod identifiers;
/// Record shapes moved between the adapter and the wire.
pub mod record;

pub use adapter::{ChangeEvent, CollectionDef, Middleware, NoopMiddleware, SyncAdapter};
pub use error::{ErrorKind, Result, SyncError};
pub use identifiers::{Did, RecordId, SpaceId, SpaceRole};
pub use record::{LocalRecord, OutboundChange, PullFailure, RemoteRecord, RemoteRecordMeta, WireChange};
