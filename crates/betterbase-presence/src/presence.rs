//! Tracks which peers are currently present in a space from the heartbeats
//! carried over its `presence` channel, evicting anyone who's gone quiet.

use betterbase_core::SpaceId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Default staleness window; matches the heartbeat cadence a client is
/// expected to publish at (every 15s, so three missed beats before
/// eviction).
pub const DEFAULT_STALE_AFTER_SECS: i64 = 45;

pub struct PresenceManager {
    stale_after_secs: i64,
    seen: Mutex<HashMap<SpaceId, HashMap<String, i64>>>,
}

impl PresenceManager {
    pub fn new(stale_after_secs: i64) -> Self {
        Self { stale_after_secs, seen: Mutex::new(HashMap::new()) }
    }

    /// Record a heartbeat (or initial join) from `peer_did` in `space_id`
    /// at `now` (unix seconds).
    pub fn heartbeat(&self, space_id: &SpaceId, peer_did: &str, now: i64) {
        self.seen.lock().entry(space_id.clone()).or_default().insert(peer_did.to_string(), now);
    }

    /// Explicit `presence.leave`.
    pub fn leave(&self, space_id: &SpaceId, peer_did: &str) {
        if let Some(peers) = self.seen.lock().get_mut(space_id) {
            peers.remove(peer_did);
        }
    }

    /// Currently-present peers, most-recent heartbeat first.
    pub fn peers(&self, space_id: &SpaceId) -> Vec<String> {
        let seen = self.seen.lock();
        let Some(peers) = seen.get(space_id) else { return Vec::new() };
        let mut ordered: Vec<(&String, &i64)> = peers.iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(a.1));
        ordered.into_iter().map(|(did, _)| did.clone()).collect()
    }

    /// Drop every peer whose last heartbeat is older than the stale
    /// window; returns the `(space, peer)` pairs evicted so the caller
    /// can emit `presence.leave`-equivalent events.
    pub fn evict_stale(&self, now: i64) -> Vec<(SpaceId, String)> {
        let mut evicted = Vec::new();
        let mut seen = self.seen.lock();
        for (space_id, peers) in seen.iter_mut() {
            peers.retain(|peer_did, last_seen| {
                let alive = now - *last_seen < self.stale_after_secs;
                if !alive {
                    evicted.push((space_id.clone(), peer_did.clone()));
                }
                alive
            });
        }
        evicted
    }
}

impl Default for PresenceManager {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_then_peers_lists_the_sender() {
        let manager = PresenceManager::default();
        let space = SpaceId::from("space-1");
        manager.heartbeat(&space, "did:key:alice", 100);
        assert_eq!(manager.peers(&space), vec!["did:key:alice".to_string()]);
    }

    #[test]
    fn stale_peers_are_evicted() {
        let manager = PresenceManager::new(30);
        let space = SpaceId::from("space-1");
        manager.heartbeat(&space, "did:key:alice", 0);
        manager.heartbeat(&space, "did:key:bob", 0);
        manager.heartbeat(&space, "did:key:bob", 20);

        let evicted = manager.evict_stale(40);
        assert_eq!(evicted, vec![(space.clone(), "did:key:alice".to_string())]);
        assert_eq!(manager.peers(&space), vec!["did:key:bob".to_string()]);
    }

    #[test]
    fn explicit_leave_removes_immediately() {
        let manager = PresenceManager::default();
        let space = SpaceId::from("space-1");
        manager.heartbeat(&space, "did:key:alice", 0);
        manager.leave(&space, "did:key:alice");
        assert!(manager.peers(&space).is_empty());
    }
}
