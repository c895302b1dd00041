//! A forward-only, single-point KEK cache for the personal-space file
//! store.
//!
//! Unlike [`betterbase_crypto::epoch::EpochKeyCache`], which retains every
//! derived epoch so a transport can still decrypt records from any
//! previously-seen epoch, this cache keeps exactly one point on the chain
//! and drops it the moment it advances. File DEK epochs in a personal
//! space only ever increase, so there is never a reason to hold more than
//! the most recent key, and not retaining old ones shrinks the forward-
//! secrecy window.

use betterbase_core::{Result, SyncError};
use betterbase_crypto::epoch::derive_forward;
use zeroize::Zeroizing;

pub struct LinearEpochCache {
    space_id: String,
    epoch: u32,
    key: Zeroizing<[u8; 32]>,
}

impl LinearEpochCache {
    /// Seeded with a defensive copy of `base_key`; the caller may zero
    /// their own buffer immediately after this call.
    pub fn new(space_id: impl Into<String>, base_epoch: u32, base_key: &[u8; 32]) -> Self {
        Self { space_id: space_id.into(), epoch: base_epoch, key: Zeroizing::new(*base_key) }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The KEK for the chain's current point, for wrapping a freshly
    /// generated upload DEK.
    pub fn current_kek(&self) -> [u8; 32] {
        *self.key
    }

    /// Derive forward to `target_epoch`, replacing the cache's single
    /// point. Returns the derived key; a no-op derivation (`target_epoch
    /// == epoch`) returns a copy of the current key.
    pub fn advance_to(&mut self, target_epoch: u32) -> Result<[u8; 32]> {
        if target_epoch < self.epoch {
            return Err(SyncError::BackwardDerivationForbidden { requested: target_epoch, base: self.epoch });
        }
        if target_epoch == self.epoch {
            return Ok(*self.key);
        }
        let derived = derive_forward(&self.key, &self.space_id, self.epoch, target_epoch)?;
        self.key = Zeroizing::new(derived);
        self.epoch = target_epoch;
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_matches_direct_derivation() {
        let base = [9u8; 32];
        let mut cache = LinearEpochCache::new("space-1", 1, &base);
        let got = cache.advance_to(4).unwrap();
        let direct = derive_forward(&base, "space-1", 1, 4).unwrap();
        assert_eq!(got, direct);
        assert_eq!(cache.epoch(), 4);
    }

    #[test]
    fn rejects_backward_advance() {
        let base = [9u8; 32];
        let mut cache = LinearEpochCache::new("space-1", 3, &base);
        assert!(matches!(cache.advance_to(1), Err(SyncError::BackwardDerivationForbidden { .. })));
    }

    #[test]
    fn same_epoch_returns_current_key() {
        let base = [5u8; 32];
        let mut cache = LinearEpochCache::new("space-1", 2, &base);
        assert_eq!(cache.advance_to(2).unwrap(), base);
    }
}
