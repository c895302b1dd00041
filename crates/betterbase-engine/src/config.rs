use betterbase_core::SyncAdapter;
use betterbase_filestore::FileStore;
use betterbase_presence::PresenceManager;
use betterbase_space::SpaceManager;
use betterbase_sync::{MultiSpaceRouter, PullSource};
use std::sync::Arc;

/// Everything a [`crate::SyncEngine`] needs wired up before it can run.
/// Construction of each subsystem (server clients, storage, identity,
/// transports) happens upstream; this only gathers the finished pieces.
pub struct SyncEngineConfig {
    pub space_manager: Arc<SpaceManager>,
    pub router: MultiSpaceRouter,
    pub adapter: Arc<dyn SyncAdapter>,
    pub pull_source: Arc<dyn PullSource>,
    pub file_store: Option<Arc<FileStore>>,
    pub presence: Arc<PresenceManager>,
}
