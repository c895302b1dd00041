//! Space lifecycle: creation, invitation, acceptance, and membership-view
//! caching on top of a hash-chained membership log, plus the external
//! collaborators ([`server::ServerApi`], [`server::AccountsDirectory`],
//! [`server::SpaceStorage`], [`identity::SpaceIdentity`]) a space manager
//! drives but never implements itself.

#![forbid(unsafe_code)]

pub mod directory;
pub mod identity;
pub mod manager;
pub mod record;
pub mod server;

pub use directory::AccountsCache;
pub use identity::SpaceIdentity;
pub use manager::{SpaceManager, DEFAULT_ROTATION_INTERVAL_SECS};
pub use record::{CachedMember, SpaceRecord, SpaceStatus};
pub use server::{AccountsDirectory, RecipientInfo, ServerApi, ServerInvitation, SpaceStorage};
