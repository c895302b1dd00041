//! Unified error type for the sync engine.
//!
//! Mirrors the error taxonomy in the design: cryptographic and structural
//! errors are typed values returned alongside successful records (never
//! poison a batch), auth errors propagate to the engine state machine, and
//! network errors are expected to be retried by the transport layer.

use serde::{Deserialize, Serialize};

/// Unified error type for all sync engine operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq, Eq)]
pub enum SyncError {
    /// AEAD tag mismatch, malformed envelope, AES-KW unwrap failure, CBOR
    /// parse failure, or a missing KEK. Always isolated to a single record.
    #[error("decrypt failure: {message}")]
    DecryptFailure {
        /// Description of what failed.
        message: String,
    },

    /// Encoded payload does not fit the largest padding bucket.
    #[error("payload too large: {len} bytes exceeds largest bucket")]
    PayloadTooLarge {
        /// The encoded length that could not be padded.
        len: usize,
    },

    /// `getKEKForEpoch(e)` was asked to derive backwards from the base epoch.
    #[error("backward derivation forbidden: requested epoch {requested} < base epoch {base}")]
    BackwardDerivationForbidden {
        /// The epoch that was requested.
        requested: u32,
        /// The base epoch the transport was constructed with.
        base: u32,
    },

    /// Forward derivation was asked to cross more than 1000 epochs in one hop.
    #[error("epoch gap too large: {gap} epochs between {from} and {to}")]
    EpochGapTooLarge {
        /// Number of epochs that would need to be derived.
        gap: u32,
        /// Epoch derivation started from.
        from: u32,
        /// Epoch derivation was targeting.
        to: u32,
    },

    /// Membership log append lost a compare-and-swap race.
    #[error("version conflict: expected {expected}, server has {actual}")]
    VersionConflict {
        /// Version the client expected to be appending after.
        expected: u64,
        /// Version the server actually holds.
        actual: u64,
    },

    /// Membership log hash-chain integrity was violated; unlike
    /// [`SyncError::VersionConflict`] this is never retried.
    #[error("hash chain broken at seq {seq}")]
    HashChainBroken {
        /// Sequence number where the chain diverged.
        seq: u64,
    },

    /// A membership log entry payload could not be parsed.
    #[error("invalid membership entry: {message}")]
    InvalidMembershipEntry {
        /// Description of the parse failure.
        message: String,
    },

    /// Missing/expired/revoked UCAN or bearer token.
    #[error("authentication error: {message}")]
    Authentication {
        /// Description of the auth failure.
        message: String,
    },

    /// Epoch rotation `begin` returned a conflict the caller must resolve.
    #[error("epoch mismatch: current={current_epoch}, rewrap_epoch={rewrap_epoch:?}")]
    EpochMismatch {
        /// The space's current committed epoch, per the server.
        current_epoch: u32,
        /// The in-flight rewrap epoch, if an advance is underway.
        rewrap_epoch: Option<u32>,
    },

    /// The requested resource does not exist server-side.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// Transport/RPC failure; callers should retry with backoff.
    #[error("network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// Quota or resource-capacity rejection from the server.
    #[error("capacity error: {message}")]
    Capacity {
        /// Description of the capacity failure.
        message: String,
    },

    /// CBOR/JSON encode or decode failure unrelated to encryption.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Programmer error or invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
    },
}

impl SyncError {
    /// Build a [`SyncError::DecryptFailure`].
    pub fn decrypt(message: impl Into<String>) -> Self {
        Self::DecryptFailure {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Network`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Serialization`].
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Authentication`].
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::InvalidMembershipEntry`].
    pub fn invalid_membership(message: impl Into<String>) -> Self {
        Self::InvalidMembershipEntry {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// The error kind used for retry/escalation classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Transient,
            Self::Authentication { .. } => ErrorKind::Auth,
            Self::Capacity { .. } => ErrorKind::Capacity,
            Self::DecryptFailure { .. }
            | Self::PayloadTooLarge { .. }
            | Self::BackwardDerivationForbidden { .. }
            | Self::EpochGapTooLarge { .. }
            | Self::InvalidMembershipEntry { .. }
            | Self::Serialization { .. } => ErrorKind::Permanent,
            Self::VersionConflict { .. }
            | Self::HashChainBroken { .. }
            | Self::EpochMismatch { .. }
            | Self::NotFound { .. }
            | Self::Internal { .. } => ErrorKind::Permanent,
        }
    }
}

/// Error taxonomy used by the scheduler's consecutive-failure quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-layer failure; retried with exponential backoff.
    Transient,
    /// Decryption, shape, or structural failure; never retried as-is.
    Permanent,
    /// UCAN/token rejection; escalates to `onAuthError`.
    Auth,
    /// Quota or resource-capacity rejection.
    Capacity,
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, SyncError>;
