//! The per-space sync transport, the multi-space router built on top of
//! it, and the scheduler that drives both from adapter dirty-state.

#![forbid(unsafe_code)]

pub mod router;
pub mod scheduler;
pub mod transport;

pub use router::{Cursors, EpochAdvanceKind, EpochAdvanceSignal, MultiSpaceRouter, PullOutcome, PullSource, PullSpaceRequest, RealtimeOutcome, RotationPolicy, SpacePullBundle, SubscriptionEntry};
pub use scheduler::{FlushReport, QuarantineTracker, Scheduler, SyncManager};
pub use transport::{EditChainIdentity, RealtimeEvent, SyncTransport, SyncTransportConfig};
