//! Concrete [`RotationPolicy`] driving [`SpaceManager`]'s opportunistic
//! epoch rotation from [`betterbase_sync::MultiSpaceRouter::run_rotation_pass`].

use betterbase_core::{Result, SpaceId};
use betterbase_space::SpaceManager;
use betterbase_sync::RotationPolicy;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

/// Wraps a [`SpaceManager`] as the router's rotation policy: a space is due
/// per [`SpaceManager::should_rotate_space`]'s admin/interval check, and
/// rotated via [`SpaceManager::rotate_space_key`].
pub struct SpaceManagerRotationPolicy {
    space_manager: Arc<SpaceManager>,
    interval_secs: i64,
}

impl SpaceManagerRotationPolicy {
    pub fn new(space_manager: Arc<SpaceManager>) -> Self {
        Self { space_manager, interval_secs: betterbase_space::DEFAULT_ROTATION_INTERVAL_SECS }
    }

    pub fn with_interval(space_manager: Arc<SpaceManager>, interval_secs: i64) -> Self {
        Self { space_manager, interval_secs }
    }
}

#[async_trait::async_trait]
impl RotationPolicy for SpaceManagerRotationPolicy {
    async fn should_rotate(&self, space_id: &SpaceId) -> bool {
        self.space_manager.should_rotate_space(space_id, now_secs(), self.interval_secs)
    }

    async fn rotate(&self, space_id: &SpaceId) -> Result<()> {
        self.space_manager.rotate_space_key(space_id, now_secs()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use betterbase_core::SpaceRole;
    use betterbase_epoch::{EpochTransport, FetchedDek};
    use betterbase_space::{AccountsDirectory, RecipientInfo, ServerApi, ServerInvitation, SpaceIdentity, SpaceStorage};
    use betterbase_transport::rpc::{DeksGetRequest, EpochBeginResponse, RewrappedDek};

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
            Ok(vec![])
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

    struct InMemoryStorage;
    #[async_trait]
    impl SpaceStorage for InMemoryStorage {
        async fn save(&self, _record: &betterbase_space::SpaceRecord) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _space_id: &SpaceId) -> Result<()> {
            Ok(())
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
            Ok("ucan.self".to_string())
        }
        fn seal_for(&self, _recipient_public_key: &serde_json::Value, _plaintext: &[u8]) -> Result<Vec<u8>> {
            unreachable!()
        }
        fn open_own(&self, _sealed: &[u8]) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    struct FakeEpochTransport;
    #[async_trait]
    impl EpochTransport for FakeEpochTransport {
        async fn begin(&self, _space_id: &SpaceId, current_epoch: u32) -> Result<EpochBeginResponse> {
            Ok(EpochBeginResponse { rewrap_epoch: current_epoch + 1, adopted: false })
        }
        async fn complete(&self, _space_id: &SpaceId, _rewrap_epoch: u32) -> Result<()> {
            Ok(())
        }
        async fn get_deks(&self, _req: &DeksGetRequest) -> Result<Vec<FetchedDek>> {
            Ok(vec![])
        }
        async fn rewrap_deks(&self, _space_id: &SpaceId, _rewrap_epoch: u32, _entries: Vec<RewrappedDek>) -> Result<()> {
            Ok(())
        }
        async fn get_file_deks(&self, _req: &DeksGetRequest) -> Result<Vec<FetchedDek>> {
            Ok(vec![])
        }
        async fn rewrap_file_deks(&self, _space_id: &SpaceId, _rewrap_epoch: u32, _entries: Vec<RewrappedDek>) -> Result<()> {
            Ok(())
        }
    }

    fn space_manager() -> Arc<SpaceManager> {
        Arc::new(SpaceManager::new(
            Arc::new(UnreachableServer),
            Arc::new(InMemoryStorage),
            Arc::new(UnreachableDirectory),
            Arc::new(UnreachableIdentity),
            Arc::new(FakeEpochTransport),
        ))
    }

    #[tokio::test]
    async fn should_rotate_is_false_for_an_unknown_space() {
        let policy = SpaceManagerRotationPolicy::new(space_manager());
        assert!(!policy.should_rotate(&SpaceId::from("space-1")).await);
    }

    #[tokio::test]
    async fn rotate_advances_a_freshly_created_admin_space() {
        let manager = space_manager();
        let space_id = manager.create_space("team".to_string(), [1u8; 32], 0).await.unwrap();
        let policy = SpaceManagerRotationPolicy::with_interval(manager.clone(), 0);

        assert!(policy.should_rotate(&space_id).await);
        policy.rotate(&space_id).await.unwrap();
        assert_eq!(manager.get_space_epoch(&space_id), Some(1));
    }
}
