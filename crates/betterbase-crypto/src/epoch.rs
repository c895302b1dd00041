//! Forward-secret epoch key chain.
//!
//! `K_e = HKDF-SHA-256(K_{e-1}, salt = spaceId, info = "epoch/" ‖ e, 32)` for
//! `e > base_epoch`. Derivation is forward-only: there is no way to recover
//! a key for an epoch below the base the cache was seeded with.

use betterbase_core::SyncError;
use hkdf::Hkdf;
use sha2::Sha256;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Hard ceiling on how many epochs a single forward derivation may cross.
pub const MAX_EPOCH_GAP: u32 = 1000;

type Key = Zeroizing<[u8; 32]>;

/// Derive the key one epoch forward from `prev_key` at `space_id`/`epoch`.
fn derive_one_step(prev_key: &[u8; 32], space_id: &str, epoch: u32) -> Key {
    let hk = Hkdf::<Sha256>::new(Some(space_id.as_bytes()), prev_key);
    let mut out = [0u8; 32];
    let info = format!("epoch/{epoch}");
    // HKDF-Expand only fails if the requested output exceeds 255*hash_len,
    // which never happens for a fixed 32-byte output.
    hk.expand(info.as_bytes(), &mut out)
        .expect("32-byte HKDF expand never exceeds RFC 5869 limits");
    Zeroizing::new(out)
}

/// Derive `K_to` from `K_from` by walking the chain one epoch at a time.
/// `from_epoch` must be `<= to_epoch`; returns `from_key` unchanged if equal.
pub fn derive_forward(
    from_key: &[u8; 32],
    space_id: &str,
    from_epoch: u32,
    to_epoch: u32,
) -> Result<[u8; 32], SyncError> {
    if to_epoch < from_epoch {
        return Err(SyncError::BackwardDerivationForbidden {
            requested: to_epoch,
            base: from_epoch,
        });
    }
    let gap = to_epoch - from_epoch;
    if gap > MAX_EPOCH_GAP {
        return Err(SyncError::EpochGapTooLarge {
            gap,
            from: from_epoch,
            to: to_epoch,
        });
    }

    let mut current = Zeroizing::new(*from_key);
    for epoch in (from_epoch + 1)..=to_epoch {
        current = derive_one_step(&current, space_id, epoch);
    }
    Ok(*current)
}

/// Derive the ephemeral channel key used for presence/event pub-sub.
pub fn channel_key_for(epoch_key: &[u8; 32], space_id: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(space_id.as_bytes()), epoch_key);
    let mut out = [0u8; 32];
    hk.expand(b"channel", &mut out)
        .expect("32-byte HKDF expand never exceeds RFC 5869 limits");
    out
}

/// Non-destructive forward-derivation cache for a single space's KEKs.
///
/// Starts containing only `base_epoch -> base_kek`. [`Self::get_kek`] derives
/// and caches every intermediate epoch on demand; it never forgets an epoch
/// once computed, and it never derives backward.
pub struct EpochKeyCache {
    space_id: String,
    base_epoch: u32,
    current_epoch: u32,
    derived: BTreeMap<u32, Key>,
}

impl EpochKeyCache {
    /// Construct a cache seeded with a *defensive copy* of `base_key`: the caller may zero their own buffer
    /// immediately after this call without affecting the cache.
    pub fn new(base_key: &[u8], base_epoch: u32, space_id: impl Into<String>) -> Self {
        let mut key = [0u8; 32];
        let len = base_key.len().min(32);
        key[..len].copy_from_slice(&base_key[..len]);
        let mut derived = BTreeMap::new();
        derived.insert(base_epoch, Zeroizing::new(key));
        Self {
            space_id: space_id.into(),
            base_epoch,
            current_epoch: base_epoch,
            derived,
        }
    }

    /// The epoch this cache was constructed with.
    pub fn base_epoch(&self) -> u32 {
        self.base_epoch
    }

    /// The epoch new records are currently encrypted under.
    pub fn current_epoch(&self) -> u32 {
        self.current_epoch
    }

    /// Advance the encryption epoch independently of the base.
    pub fn update_encryption_epoch(&mut self, epoch: u32) {
        self.current_epoch = self.current_epoch.max(epoch);
    }

    /// Return the KEK for `epoch`, deriving forward from the closest cached
    /// ancestor and caching every step along the way.
    pub fn get_kek(&mut self, epoch: u32) -> Result<[u8; 32], SyncError> {
        if epoch < self.base_epoch {
            return Err(SyncError::BackwardDerivationForbidden {
                requested: epoch,
                base: self.base_epoch,
            });
        }
        if let Some(key) = self.derived.get(&epoch) {
            return Ok(**key);
        }

        let gap_from_base = epoch - self.base_epoch;
        if gap_from_base > MAX_EPOCH_GAP {
            return Err(SyncError::EpochGapTooLarge {
                gap: gap_from_base,
                from: self.base_epoch,
                to: epoch,
            });
        }

        // Walk back to the highest cached ancestor <= epoch.
        let (&ancestor_epoch, ancestor_key) = self
            .derived
            .range(..=epoch)
            .next_back()
            .expect("base_epoch is always present");
        let mut current = Zeroizing::new(**ancestor_key);
        for e in (ancestor_epoch + 1)..=epoch {
            current = derive_one_step(&current, &self.space_id, e);
            self.derived.insert(e, current.clone());
        }
        Ok(*current)
    }

    /// The channel key for `epoch`, used for ephemeral presence/event pub-sub.
    pub fn get_channel_key(&mut self, epoch: u32) -> Result<[u8; 32], SyncError> {
        let kek = self.get_kek(epoch)?;
        Ok(channel_key_for(&kek, &self.space_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_derivation_is_deterministic() {
        let key = [7u8; 32];
        let a = derive_forward(&key, "space-1", 1, 5).unwrap();
        let b = derive_forward(&key, "space-1", 1, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn backward_derivation_forbidden() {
        let key = [7u8; 32];
        assert!(derive_forward(&key, "space-1", 5, 1).is_err());
    }

    #[test]
    fn gap_too_large_fails() {
        let key = [7u8; 32];
        assert!(derive_forward(&key, "space-1", 0, MAX_EPOCH_GAP + 1).is_err());
    }

    #[test]
    fn cache_matches_direct_derivation() {
        let key = [9u8; 32];
        let mut cache = EpochKeyCache::new(&key, 1, "space-1");
        let cached = cache.get_kek(4).unwrap();
        let direct = derive_forward(&key, "space-1", 1, 4).unwrap();
        assert_eq!(cached, direct);
    }

    #[test]
    fn cache_rejects_backward() {
        let key = [9u8; 32];
        let mut cache = EpochKeyCache::new(&key, 3, "space-1");
        assert!(matches!(
            cache.get_kek(1),
            Err(SyncError::BackwardDerivationForbidden { .. })
        ));
    }

    #[test]
    fn defensive_copy_survives_zeroing() {
        let mut key = [9u8; 32];
        let mut cache = EpochKeyCache::new(&key, 1, "space-1");
        key.iter_mut().for_each(|b| *b = 0);
        // The cache holds its own copy; zeroing the caller's buffer must not
        // affect subsequent derivation.
        let k1 = cache.get_kek(1).unwrap();
        assert_ne!(k1, [0u8; 32]);
    }
}
