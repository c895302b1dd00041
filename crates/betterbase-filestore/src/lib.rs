//! Local-first encrypted blob cache: an offline-capable upload queue and a
//! lazy fetch-and-decrypt download path, keyed by `(space, fileId)`. Works
//! before any space is connected to sync; progressively drains its queue
//! once a [`remote::FileTransport`] is wired up.

#![forbid(unsafe_code)]

pub mod cache;
pub mod key;
pub mod manager;
pub mod meta;
pub mod remote;
pub mod store;
pub mod url_cache;

pub use cache::LinearEpochCache;
pub use key::FileKey;
pub use manager::{FileStore, FileStoreConfig, DEFAULT_MAX_UPLOAD_ATTEMPTS};
pub use meta::{FileMeta, UploadState, UploadStatus};
pub use remote::{EnsureSynced, FileTransport};
pub use store::LocalBlobStore;
pub use url_cache::{UrlCache, UrlRevoker};
