//! Ephemeral, encrypted pub/sub for a space's `presence` and `event`
//! channels: no persistence, a replay window per sender, and heartbeat
//! eviction for presence.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod event;
pub mod presence;
pub mod replay;

pub use event::{Channel, EventManager};
pub use presence::{PresenceManager, DEFAULT_STALE_AFTER_SECS};
pub use replay::ReplayWindow;
