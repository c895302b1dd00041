//! The RPC surface a space's epoch rotation drives. Implementations live
//! outside this crate, wrapping a realtime connection.

use async_trait::async_trait;
use betterbase_core::{Result, SpaceId};
use betterbase_transport::rpc::{DeksGetRequest, EpochBeginResponse, RewrappedDek};

/// One wrapped DEK fetched from the server ahead of a rewrap pass.
pub struct FetchedDek {
    pub id: String,
    pub wrapped: Vec<u8>,
}

/// Server-side `epoch.*`/`deks.*` operations an epoch advance needs.
///
/// `deks` and `file_deks` are kept as separate method pairs because the two
/// collections are rewrapped independently but under the same target epoch.
#[async_trait]
pub trait EpochTransport: Send + Sync {
    /// `epoch.begin` — attempt to start an advance from `current_epoch`.
    async fn begin(&self, space_id: &SpaceId, current_epoch: u32) -> Result<EpochBeginResponse>;

    /// `epoch.complete` — commit a finished rewrap.
    async fn complete(&self, space_id: &SpaceId, rewrap_epoch: u32) -> Result<()>;

    /// `deks.get` — record DEKs still wrapped below `rewrap_epoch`.
    async fn get_deks(&self, req: &DeksGetRequest) -> Result<Vec<FetchedDek>>;

    /// `deks.rewrap` — submit record DEKs rewrapped under `rewrap_epoch`.
    async fn rewrap_deks(&self, space_id: &SpaceId, rewrap_epoch: u32, entries: Vec<RewrappedDek>) -> Result<()>;

    /// `file_deks.get` — file DEKs still wrapped below `rewrap_epoch`.
    async fn get_file_deks(&self, req: &DeksGetRequest) -> Result<Vec<FetchedDek>>;

    /// `file_deks.rewrap` — submit file DEKs rewrapped under `rewrap_epoch`.
    async fn rewrap_file_deks(&self, space_id: &SpaceId, rewrap_epoch: u32, entries: Vec<RewrappedDek>) -> Result<()>;
}
