//! A space's local epoch state: the current encryption key, its epoch
//! number, and the forward-derivation cache used to answer KEK lookups for
//! older epochs still referenced by unrewrapped ciphertext.

use betterbase_crypto::epoch::EpochKeyCache;
use zeroize::Zeroizing;

/// One space's local view of its epoch key chain.
pub struct EpochState {
    space_id: String,
    current_epoch: u32,
    key: Zeroizing<[u8; 32]>,
    cache: EpochKeyCache,
    advanced_at: i64,
}

impl EpochState {
    /// Seed state at `base_epoch`/`base_key`, with `advanced_at` the time
    /// this epoch was (or is assumed to have been) established.
    pub fn new(space_id: impl Into<String>, base_epoch: u32, base_key: &[u8; 32], advanced_at: i64) -> Self {
        let space_id = space_id.into();
        let cache = EpochKeyCache::new(base_key, base_epoch, space_id.clone());
        Self {
            space_id,
            current_epoch: base_epoch,
            key: Zeroizing::new(*base_key),
            cache,
            advanced_at,
        }
    }

    pub fn current_epoch(&self) -> u32 {
        self.current_epoch
    }

    pub fn advanced_at(&self) -> i64 {
        self.advanced_at
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn cache_mut(&mut self) -> &mut EpochKeyCache {
        &mut self.cache
    }

    /// Replace the current epoch and key with a newly rotated pair.
    ///
    /// `new_key` must be assigned only after the old key is destroyed: if
    /// the caller ever passes a buffer that aliases `self.key`, zeroing
    /// first and storing second would overwrite the value being stored.
    /// This method takes `new_key` by value for exactly that reason — the
    /// caller cannot retain a live alias to pass back in.
    pub fn update(&mut self, new_epoch: u32, new_key: Zeroizing<[u8; 32]>, advanced_at: i64) {
        self.key.iter_mut().for_each(|b| *b = 0);
        self.key = new_key;
        self.current_epoch = new_epoch;
        self.advanced_at = advanced_at;
        self.cache.update_encryption_epoch(new_epoch);
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_replaces_epoch_and_key() {
        let mut state = EpochState::new("space-1", 1, &[1u8; 32], 1000);
        state.update(2, Zeroizing::new([2u8; 32]), 2000);
        assert_eq!(state.current_epoch(), 2);
        assert_eq!(*state.key(), [2u8; 32]);
        assert_eq!(state.advanced_at(), 2000);
    }

    #[test]
    fn update_does_not_leave_old_key_in_new_buffer() {
        let mut state = EpochState::new("space-1", 1, &[9u8; 32], 0);
        let new_key = Zeroizing::new([5u8; 32]);
        state.update(2, new_key, 1);
        // the old key (all 9s) must not have leaked into the stored key
        assert_ne!(*state.key(), [9u8; 32]);
        assert_eq!(*state.key(), [5u8; 32]);
    }
}
