//! The top-level handle an application holds: one [`SyncEngine`] per local
//! client, wiring together space membership, multi-space sync, file
//! storage, and presence, and fanning their outcomes out over
//! [`crate::events::EngineEvents`].

use crate::config::SyncEngineConfig;
use crate::events::{EventSenders, InvitationEvent, PresenceEvent, PresenceEventKind, SyncEvent};
use crate::rotation::SpaceManagerRotationPolicy;
use async_lock::Mutex as AsyncMutex;
use betterbase_core::{Result, SpaceId, SyncAdapter, SyncError};
use betterbase_epoch::RevocationSideEffects;
use betterbase_filestore::FileStore;
use betterbase_presence::PresenceManager;
use betterbase_space::{SpaceManager, SpaceStatus};
use betterbase_sync::{MultiSpaceRouter, PullSource, SyncManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use crate::events::EngineEvents;

/// One local client's sync engine. Cheap to clone via `Arc`; every method
/// takes `&self` so it can be shared across tasks without an outer lock.
pub struct SyncEngine {
    space_manager: Arc<SpaceManager>,
    router: AsyncMutex<MultiSpaceRouter>,
    sync_manager: SyncManager,
    adapter: Arc<dyn SyncAdapter>,
    pull_source: Arc<dyn PullSource>,
    file_store: Option<Arc<FileStore>>,
    presence: Arc<PresenceManager>,
    rotation_policy: SpaceManagerRotationPolicy,
    events: EventSenders,
    disposed: AtomicBool,
}

impl SyncEngine {
    /// Build the engine and hand back its event receivers. `on_open` fires
    /// once, synchronously, before this returns.
    pub fn create(config: SyncEngineConfig) -> (Arc<Self>, EngineEvents) {
        let (events, rx) = EventSenders::new();
        let rotation_policy = SpaceManagerRotationPolicy::new(config.space_manager.clone());
        let engine = Arc::new(Self {
            space_manager: config.space_manager,
            router: AsyncMutex::new(config.router),
            sync_manager: SyncManager::new(),
            adapter: config.adapter,
            pull_source: config.pull_source,
            file_store: config.file_store,
            presence: config.presence,
            rotation_policy,
            events,
            disposed: AtomicBool::new(false),
        });
        let _ = engine.events.on_open.send(());
        (engine, rx)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SyncError::internal("sync engine has been disposed"));
        }
        Ok(())
    }

    /// Tear down the engine. Idempotent: a second call is a no-op, so
    /// callers racing shutdown with an in-flight `Arc<SyncEngine>` never
    /// double-fire `on_close`.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.events.on_close.send(());
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn space_manager(&self) -> &Arc<SpaceManager> {
        &self.space_manager
    }

    pub fn presence(&self) -> &Arc<PresenceManager> {
        &self.presence
    }

    pub fn file_store(&self) -> Option<&Arc<FileStore>> {
        self.file_store.as_ref()
    }

    pub fn schedule_push(&self, collection: &str) {
        self.sync_manager.schedule_push(collection);
    }

    /// Push everything scheduled since the last flush, pull every registered
    /// collection, then run an opportunistic rotation pass over every active
    /// space; re-checks disposal before emitting so a `dispose()` racing a
    /// long pull never fires `on_sync` afterward.
    pub async fn flush(&self) -> Result<()> {
        self.check_disposed()?;
        let mut router = self.router.lock().await;
        let report = self.sync_manager.flush_all(self.adapter.as_ref(), &mut router, self.pull_source.as_ref()).await?;
        router.run_rotation_pass(&self.rotation_policy).await;
        drop(router);
        self.check_disposed()?;
        let _ = self.events.on_sync.send(SyncEvent {
            pushed: report.pushed,
            pulled_collections: report.pulled_collections,
            newly_quarantined: report.newly_quarantined,
        });
        Ok(())
    }

    /// Drain the invitation mailbox and emit `on_invitation`/`on_revoked`
    /// for what changed. Revocation detection diffs the router's tracked
    /// spaces' status before and after the call, since the space manager
    /// itself only returns an imported-invitation count.
    pub async fn check_invitations(&self, side_effects: &dyn RevocationSideEffects, now: i64) -> Result<usize> {
        self.check_disposed()?;
        let tracked_before: Vec<(SpaceId, SpaceStatus)> = {
            let router = self.router.lock().await;
            router.active_spaces().into_iter().filter_map(|id| self.space_manager.record(&id).map(|r| (id, r.status))).collect()
        };

        let imported = self.space_manager.check_invitations(side_effects, now).await?;
        self.check_disposed()?;

        for (space_id, previous_status) in tracked_before {
            if previous_status == SpaceStatus::Removed {
                continue;
            }
            if let Some(record) = self.space_manager.record(&space_id) {
                if record.status == SpaceStatus::Removed {
                    let _ = self.events.on_revoked.send(space_id);
                }
            }
        }
        if imported > 0 {
            let _ = self.events.on_invitation.send(InvitationEvent { imported_count: imported });
        }
        Ok(imported)
    }

    /// Record a heartbeat and emit `on_presence`.
    pub fn heartbeat_presence(&self, space_id: &SpaceId, peer_did: &str, now: i64) {
        self.presence.heartbeat(space_id, peer_did, now);
        let _ = self.events.on_presence.send(PresenceEvent {
            space_id: space_id.clone(),
            peer_did: peer_did.to_string(),
            kind: PresenceEventKind::Heartbeat,
        });
    }

    pub fn leave_presence(&self, space_id: &SpaceId, peer_did: &str) {
        self.presence.leave(space_id, peer_did);
        let _ = self.events.on_presence.send(PresenceEvent {
            space_id: space_id.clone(),
            peer_did: peer_did.to_string(),
            kind: PresenceEventKind::Left,
        });
    }

    /// Evict peers who've gone quiet and emit `on_presence` for each.
    pub fn evict_stale_presence(&self, now: i64) {
        for (space_id, peer_did) in self.presence.evict_stale(now) {
            let _ = self.events.on_presence.send(PresenceEvent { space_id, peer_did, kind: PresenceEventKind::Stale });
        }
    }

    /// Drive the file store's upload queue one pass forward.
    pub async fn process_file_queue(&self) -> Result<()> {
        self.check_disposed()?;
        if let Some(store) = &self.file_store {
            store.process_queue().await?;
        }
        Ok(())
    }

    /// Register a shared space's transport with the router, e.g. right
    /// after [`Self::check_invitations`] reports a newly-accepted space.
    pub async fn ensure_shared_transport(&self, space_id: SpaceId, transport: betterbase_sync::SyncTransport) {
        self.router.lock().await.ensure_shared_transport(space_id, transport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use betterbase_core::{CollectionDef, LocalRecord, RemoteRecord, SpaceRole};
    use betterbase_space::{AccountsDirectory, RecipientInfo, ServerApi, ServerInvitation, SpaceIdentity, SpaceStorage};
    use betterbase_sync::{PullSpaceRequest, SpacePullBundle, SyncTransportConfig};
    use std::collections::HashSet;

    struct EmptyAdapter;

    #[async_trait]
    impl SyncAdapter for EmptyAdapter {
        fn collections(&self) -> Vec<CollectionDef> {
            vec![]
        }
        async fn get_dirty(&self, _collection: &str, _space_id: &SpaceId) -> Result<Vec<LocalRecord>> {
            Ok(vec![])
        }
        async fn apply_remote_records(&self, _collection: &CollectionDef, _records: Vec<RemoteRecord>, _server_seq: u64) -> Result<()> {
            Ok(())
        }
        async fn mark_synced(&self, _collection: &str, _space_id: &SpaceId, _ids: &[String]) -> Result<()> {
            Ok(())
        }
        async fn get_last_sequence(&self, _collection: &str, _space_id: &SpaceId) -> Result<u64> {
            Ok(0)
        }
    }

    struct EmptyPullSource;

    #[async_trait]
    impl PullSource for EmptyPullSource {
        async fn pull(&self, _requests: Vec<PullSpaceRequest>, _collection: &str) -> Result<Vec<SpacePullBundle>> {
            Ok(vec![])
        }
    }

    struct UnreachableServer;

    #[async_trait]
    impl ServerApi for UnreachableServer {
        async fn create_space(&self, _root_public_key: &serde_json::Value) -> Result<SpaceId> {
            unreachable!()
        }
        async fn append_entry(&self, _space_id: &SpaceId, _entry: &betterbase_journal::LogEntry, _expected_version: u64) -> Result<betterbase_journal::AppendOutcome> {
            unreachable!()
        }
        async fn list_entries(&self, _space_id: &SpaceId, _since_seq: u64) -> Result<Vec<betterbase_journal::LogEntry>> {
            unreachable!()
        }
        async fn revoke_ucan(&self, _space_id: &SpaceId, _cid: &str) -> Result<()> {
            unreachable!()
        }
        async fn create_invitation(&self, _mailbox_id: &str, _ciphertext: Vec<u8>) -> Result<String> {
            unreachable!()
        }
        async fn list_invitations(&self) -> Result<Vec<ServerInvitation>> {
            Ok(vec![])
        }
        async fn delete_invitation(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct UnreachableDirectory;

    #[async_trait]
    impl AccountsDirectory for UnreachableDirectory {
        async fn lookup(&self, _handle: &str) -> Result<RecipientInfo> {
            unreachable!()
        }
    }

    struct UnreachableStorage;

    #[async_trait]
    impl SpaceStorage for UnreachableStorage {
        async fn save(&self, _record: &betterbase_space::SpaceRecord) -> Result<()> {
            unreachable!()
        }
        async fn delete(&self, _space_id: &SpaceId) -> Result<()> {
            unreachable!()
        }
        async fn load_all(&self) -> Result<Vec<betterbase_space::SpaceRecord>> {
            Ok(vec![])
        }
    }

    struct UnreachableIdentity;

    #[async_trait]
    impl SpaceIdentity for UnreachableIdentity {
        fn did(&self) -> &str {
            "did:key:unused"
        }
        fn handle(&self) -> Option<&str> {
            None
        }
        fn public_key_jwk(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn sign(&self, _message: &[u8]) -> Vec<u8> {
            unreachable!()
        }
        async fn delegate_ucan(&self, _audience_did: &str, _role: SpaceRole, _expires_at: Option<i64>) -> Result<String> {
            unreachable!()
        }
        async fn self_issued_ucan(&self, _role: SpaceRole) -> Result<String> {
            unreachable!()
        }
        fn seal_for(&self, _recipient_public_key: &serde_json::Value, _plaintext: &[u8]) -> Result<Vec<u8>> {
            unreachable!()
        }
        fn open_own(&self, _sealed: &[u8]) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    struct UnreachableEpochTransport;

    #[async_trait]
    impl betterbase_epoch::EpochTransport for UnreachableEpochTransport {
        async fn begin(&self, _space_id: &SpaceId, _current_epoch: u32) -> Result<betterbase_transport::rpc::EpochBeginResponse> {
            unreachable!()
        }
        async fn complete(&self, _space_id: &SpaceId, _rewrap_epoch: u32) -> Result<()> {
            unreachable!()
        }
        async fn get_deks(&self, _req: &betterbase_transport::rpc::DeksGetRequest) -> Result<Vec<betterbase_epoch::FetchedDek>> {
            unreachable!()
        }
        async fn rewrap_deks(&self, _space_id: &SpaceId, _rewrap_epoch: u32, _entries: Vec<betterbase_transport::rpc::RewrappedDek>) -> Result<()> {
            unreachable!()
        }
        async fn get_file_deks(&self, _req: &betterbase_transport::rpc::DeksGetRequest) -> Result<Vec<betterbase_epoch::FetchedDek>> {
            unreachable!()
        }
        async fn rewrap_file_deks(&self, _space_id: &SpaceId, _rewrap_epoch: u32, _entries: Vec<betterbase_transport::rpc::RewrappedDek>) -> Result<()> {
            unreachable!()
        }
    }

    struct StubSideEffects;

    #[async_trait]
    impl RevocationSideEffects for StubSideEffects {
        async fn revoke_ucans(&self, _space_id: &SpaceId, _member_did: &str) -> Result<()> {
            Ok(())
        }
        async fn reencrypt_and_append(&self, _space_id: &SpaceId, _payloads: Vec<betterbase_epoch::ReencryptedPayload>) -> Result<()> {
            Ok(())
        }
        async fn notify_removed_member(&self, _space_id: &SpaceId, _member_did: &str) -> Result<()> {
            Ok(())
        }
        async fn probe_membership(&self, _space_id: &SpaceId) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> (SyncEngineConfig, SpaceId) {
        let personal = SpaceId::from("personal-space");
        let space_manager = Arc::new(SpaceManager::new(
            Arc::new(UnreachableServer),
            Arc::new(UnreachableStorage),
            Arc::new(UnreachableDirectory),
            Arc::new(UnreachableIdentity),
            Arc::new(UnreachableEpochTransport),
        ));
        let transport = betterbase_sync::SyncTransport::new(SyncTransportConfig {
            space_id: personal.clone(),
            padding_buckets: vec![256, 1024, 4096],
            epoch_key: Some([0u8; 32]),
            base_epoch: 0,
            edit_chain_collections: HashSet::new(),
            identity: None,
        });
        let router = MultiSpaceRouter::new(personal.clone(), transport);
        let config = SyncEngineConfig {
            space_manager,
            router,
            adapter: Arc::new(EmptyAdapter),
            pull_source: Arc::new(EmptyPullSource),
            file_store: None,
            presence: Arc::new(PresenceManager::default()),
        };
        (config, personal)
    }

    #[tokio::test]
    async fn create_emits_on_open_and_dispose_emits_on_close_once() {
        let (config, _) = test_config();
        let (engine, mut events) = SyncEngine::create(config);
        assert!(events.on_open.try_recv().is_ok());

        engine.dispose();
        engine.dispose();
        assert!(events.on_close.try_recv().is_ok());
        assert!(events.on_close.try_recv().is_err());
    }

    #[tokio::test]
    async fn operations_after_dispose_are_rejected() {
        let (config, _) = test_config();
        let (engine, _events) = SyncEngine::create(config);
        engine.dispose();
        assert!(engine.flush().await.is_err());
        assert!(engine.check_invitations(&StubSideEffects, 0).await.is_err());
    }

    #[tokio::test]
    async fn flush_with_no_dirty_collections_emits_empty_sync_event() {
        let (config, _) = test_config();
        let (engine, mut events) = SyncEngine::create(config);
        engine.flush().await.unwrap();
        let event = events.on_sync.try_recv().unwrap();
        assert_eq!(event.pushed, 0);
        assert_eq!(event.pulled_collections, 0);
    }

    #[tokio::test]
    async fn check_invitations_with_empty_mailbox_emits_nothing() {
        let (config, _) = test_config();
        let (engine, mut events) = SyncEngine::create(config);
        let imported = engine.check_invitations(&StubSideEffects, 1_000).await.unwrap();
        assert_eq!(imported, 0);
        assert!(events.on_invitation.try_recv().is_err());
        assert!(events.on_revoked.try_recv().is_err());
    }

    #[tokio::test]
    async fn presence_heartbeat_and_eviction_emit_events() {
        let (config, _) = test_config();
        let (engine, mut events) = SyncEngine::create(config);
        let space = SpaceId::from("space-1");
        engine.heartbeat_presence(&space, "did:key:alice", 0);
        assert!(matches!(events.on_presence.try_recv().unwrap().kind, PresenceEventKind::Heartbeat));

        engine.evict_stale_presence(1_000);
        assert!(matches!(events.on_presence.try_recv().unwrap().kind, PresenceEventKind::Stale));
    }
}
