//! Wires space membership, multi-space sync, file storage, and presence
//! into one client-facing handle: [`SyncEngine`].

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod events;
pub mod rotation;

pub use config::SyncEngineConfig;
pub use engine::SyncEngine;
pub use events::{EngineEvents, InvitationEvent, PresenceEvent, PresenceEventKind, SyncEvent};
pub use rotation::SpaceManagerRotationPolicy;
