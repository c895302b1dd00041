//! The persisted shape of one space as the space manager tracks it.

use betterbase_core::{SpaceId, SpaceRole};
use betterbase_journal::MemberView;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a space record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceStatus {
    Active,
    Invited,
    Removed,
}

/// One space as tracked locally. `space_key` lives in [`crate::manager::SpaceManager`]'s
/// in-memory key table, not here — this type is the persisted-metadata half.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub space_id: SpaceId,
    pub name: String,
    pub status: SpaceStatus,
    pub role: SpaceRole,
    pub ucan_chain: String,
    #[serde(with = "serde_bytes")]
    pub root_public_key: Vec<u8>,
    pub epoch: u32,
    /// `None` until the first epoch advance this client has observed;
    /// [`crate::manager::SpaceManager::initialize_from_spaces`] backfills it
    /// to the current time rather than assuming a rotation is overdue.
    pub epoch_advanced_at: Option<i64>,
    pub members: Vec<CachedMember>,
    pub membership_log_seq: u64,
    pub metadata_version: u64,
    pub rewrap_epoch: Option<u32>,
    pub server_invitation_id: Option<String>,
}

/// A cached, serializable projection of [`MemberView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMember {
    pub audience_did: String,
    pub status: String,
    pub handle: Option<String>,
}

impl From<&MemberView> for CachedMember {
    fn from(view: &MemberView) -> Self {
        let status = match view.status {
            betterbase_journal::MemberStatus::Pending => "pending",
            betterbase_journal::MemberStatus::Joined => "joined",
            betterbase_journal::MemberStatus::Declined => "declined",
            betterbase_journal::MemberStatus::Revoked => "revoked",
        };
        CachedMember { audience_did: view.audience_did.clone(), status: status.to_string(), handle: view.handle.clone() }
    }
}
