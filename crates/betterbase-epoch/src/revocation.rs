//! Member removal: the admin-side sequence that revokes a member's access,
//! and the removed member's own detection of a revocation in flight.

use crate::rotation::advance_epoch;
use crate::state::EpochState;
use crate::transport::EpochTransport;
use betterbase_core::{Result, SpaceId, SyncError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Guards against two overlapping `remove_member` calls racing on the same
/// space's epoch state. Entered before the first server call, released
/// whether the sequence succeeds or fails.
#[derive(Clone, Default)]
pub struct ActiveRemovalGuard {
    spaces: Arc<Mutex<HashSet<String>>>,
}

impl ActiveRemovalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guard for `space_id`. Returns `None` if a removal is
    /// already in progress for this space.
    pub fn enter(&self, space_id: &str) -> Option<RemovalLease> {
        let mut spaces = self.spaces.lock();
        if !spaces.insert(space_id.to_string()) {
            return None;
        }
        Some(RemovalLease { guard: self.clone(), space_id: space_id.to_string() })
    }

    pub fn is_active(&self, space_id: &str) -> bool {
        self.spaces.lock().contains(space_id)
    }
}

/// Releases its space from the guard on drop, regardless of how the
/// removal sequence ends.
pub struct RemovalLease {
    guard: ActiveRemovalGuard,
    space_id: String,
}

impl Drop for RemovalLease {
    fn drop(&mut self) {
        self.guard.spaces.lock().remove(&self.space_id);
    }
}

/// One member's remaining membership-log payload, re-encrypted under the
/// new epoch key as part of a removal.
pub struct ReencryptedPayload {
    pub audience_did: String,
    pub ciphertext: Vec<u8>,
}

/// Collaborators a revocation drives beyond the epoch transport itself:
/// revoking UCANs, re-appending membership entries, and notifying the
/// removed member's mailbox.
#[async_trait::async_trait]
pub trait RevocationSideEffects: Send + Sync {
    /// Revoke every UCAN CID issued to `member_did` in this space.
    async fn revoke_ucans(&self, space_id: &SpaceId, member_did: &str) -> Result<()>;

    /// Re-encrypt and append `payload` for a remaining member under the new
    /// epoch, and append a signed revocation entry for the removed member.
    async fn reencrypt_and_append(&self, space_id: &SpaceId, payloads: Vec<ReencryptedPayload>) -> Result<()>;

    /// Best-effort JWE notice to the removed member's mailbox; failure here
    /// never blocks the revocation from completing.
    async fn notify_removed_member(&self, space_id: &SpaceId, member_did: &str) -> Result<()>;

    /// Probe used by [`verify_revocation`]: list the membership log as the
    /// (possibly already-removed) caller, so a `forbidden` response can
    /// confirm the removal.
    async fn probe_membership(&self, space_id: &SpaceId) -> Result<()>;
}

/// Remove `member_did` from `space_id`: advance the epoch with
/// `set_min_key_generation` (no grace period — the removed member must
/// never be able to derive forward into the new epoch), rewrap every DEK,
/// then re-encrypt the remaining members' membership entries under the new
/// key before finally committing local epoch state.
pub async fn remove_member(
    guard: &ActiveRemovalGuard,
    transport: &dyn EpochTransport,
    side_effects: &dyn RevocationSideEffects,
    state: &mut EpochState,
    member_did: &str,
    remaining_members: Vec<ReencryptedPayload>,
    now: i64,
) -> Result<()> {
    let space_id = SpaceId::from(state.space_id().to_string());

    let Some(_lease) = guard.enter(space_id.as_str()) else {
        return Err(SyncError::internal(format!(
            "removal already in progress for space {}",
            space_id
        )));
    };

    side_effects.revoke_ucans(&space_id, member_did).await?;

    advance_epoch(transport, state, true, now).await?;

    side_effects.reencrypt_and_append(&space_id, remaining_members).await?;

    // Best-effort: a failed mailbox notice does not unwind the revocation,
    // the removed member will discover it via verify_revocation instead.
    let _ = side_effects.notify_removed_member(&space_id, member_did).await;

    Ok(())
}

/// Outcome of checking an incoming revocation notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationVerdict {
    /// Confirmed: the membership probe came back `forbidden`.
    Confirmed,
    /// The notice is stale, or a removal for this space is already known,
    /// or already in progress locally.
    Ignored,
    /// The probe failed for an unrelated reason; try again later.
    Deferred,
}

/// Handle a revocation notice addressed to us. `known_spaces` reports
/// whether `space_id` is one we still consider active (not already marked
/// removed), and `notice_epoch` is the epoch the notice claims; a notice
/// at or below our locally known epoch is stale and ignored.
pub async fn verify_revocation(
    guard: &ActiveRemovalGuard,
    side_effects: &dyn RevocationSideEffects,
    space_id: &SpaceId,
    known_spaces: bool,
    local_epoch: u32,
    notice_epoch: u32,
) -> RevocationVerdict {
    if !known_spaces || guard.is_active(space_id.as_str()) {
        return RevocationVerdict::Ignored;
    }
    if notice_epoch <= local_epoch {
        return RevocationVerdict::Ignored;
    }

    match side_effects.probe_membership(space_id).await {
        Err(SyncError::Authentication { .. }) => RevocationVerdict::Confirmed,
        Err(_) => RevocationVerdict::Deferred,
        Ok(()) => RevocationVerdict::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_concurrent_entry_for_same_space() {
        let guard = ActiveRemovalGuard::new();
        let lease = guard.enter("space-1");
        assert!(lease.is_some());
        assert!(guard.enter("space-1").is_none());
        assert!(guard.enter("space-2").is_some());
    }

    #[test]
    fn guard_releases_on_drop() {
        let guard = ActiveRemovalGuard::new();
        {
            let _lease = guard.enter("space-1");
            assert!(guard.is_active("space-1"));
        }
        assert!(!guard.is_active("space-1"));
        assert!(guard.enter("space-1").is_some());
    }

    struct StubSideEffects {
        probe_result: Result<()>,
    }

    #[async_trait::async_trait]
    impl RevocationSideEffects for StubSideEffects {
        async fn revoke_ucans(&self, _space_id: &SpaceId, _member_did: &str) -> Result<()> {
            Ok(())
        }
        async fn reencrypt_and_append(&self, _space_id: &SpaceId, _payloads: Vec<ReencryptedPayload>) -> Result<()> {
            Ok(())
        }
        async fn notify_removed_member(&self, _space_id: &SpaceId, _member_did: &str) -> Result<()> {
            Ok(())
        }
        async fn probe_membership(&self, _space_id: &SpaceId) -> Result<()> {
            self.probe_result.clone()
        }
    }

    #[tokio::test]
    async fn forbidden_probe_confirms_revocation() {
        let guard = ActiveRemovalGuard::new();
        let side_effects = StubSideEffects { probe_result: Err(SyncError::auth("forbidden")) };
        let space_id = SpaceId::from("space-1");
        let verdict = verify_revocation(&guard, &side_effects, &space_id, true, 1, 2).await;
        assert_eq!(verdict, RevocationVerdict::Confirmed);
    }

    #[tokio::test]
    async fn stale_notice_is_ignored() {
        let guard = ActiveRemovalGuard::new();
        let side_effects = StubSideEffects { probe_result: Err(SyncError::auth("forbidden")) };
        let space_id = SpaceId::from("space-1");
        let verdict = verify_revocation(&guard, &side_effects, &space_id, true, 5, 5).await;
        assert_eq!(verdict, RevocationVerdict::Ignored);
    }

    #[tokio::test]
    async fn other_error_defers() {
        let guard = ActiveRemovalGuard::new();
        let side_effects = StubSideEffects { probe_result: Err(SyncError::network("timeout")) };
        let space_id = SpaceId::from("space-1");
        let verdict = verify_revocation(&guard, &side_effects, &space_id, true, 1, 2).await;
        assert_eq!(verdict, RevocationVerdict::Deferred);
    }

    #[tokio::test]
    async fn unknown_space_is_ignored() {
        let guard = ActiveRemovalGuard::new();
        let side_effects = StubSideEffects { probe_result: Err(SyncError::auth("forbidden")) };
        let space_id = SpaceId::from("space-1");
        let verdict = verify_revocation(&guard, &side_effects, &space_id, false, 1, 2).await;
        assert_eq!(verdict, RevocationVerdict::Ignored);
    }
}
