//! `meta` store row shape: everything needed to drive the upload queue and
//! LRU eviction without touching the (possibly large) blob itself.

use crate::key::FileKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadState {
    pub status: UploadStatus,
    pub attempts: u32,
    pub record_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub key: FileKey,
    pub len: u64,
    /// Unix milliseconds; the eviction clock.
    pub last_accessed: i64,
    /// `None` once a file has no pending upload (synced, or never queued).
    pub upload: Option<UploadState>,
}
