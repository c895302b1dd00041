//! One router per client: dispatches push/pull across every active space's
//! [`SyncTransport`] and tracks per-(collection, space) cursors.

use crate::transport::{RealtimeEvent, SyncTransport};
use async_trait::async_trait;
use betterbase_core::{LocalRecord, OutboundChange, PullFailure, RemoteRecord, Result, SpaceId};
use std::collections::HashMap;

/// Per-(collection, space) pull cursors, monotonically advanced.
#[derive(Default)]
pub struct Cursors {
    values: HashMap<(String, SpaceId), u64>,
}

impl Cursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, space: &SpaceId) -> u64 {
        self.values.get(&(collection.to_string(), space.clone())).copied().unwrap_or(0)
    }

    /// Advance the cursor for `(collection, space)`; never moves backward.
    pub fn set(&mut self, collection: &str, space: &SpaceId, value: u64) {
        let entry = self.values.entry((collection.to_string(), space.clone())).or_insert(0);
        *entry = (*entry).max(value);
    }

    /// The highest cursor across `collections` for `space`, used to build
    /// the subscription vector's `since`.
    pub fn max_for_space(&self, space: &SpaceId, collections: &[String]) -> u64 {
        collections.iter().map(|c| self.get(c, space)).max().unwrap_or(0)
    }
}

/// One entry of the subscription vector sent to `subscribe`.
pub struct SubscriptionEntry {
    pub space_id: SpaceId,
    pub since: u64,
}

/// One space's request half of a `pull` RPC.
pub struct PullSpaceRequest {
    pub space_id: SpaceId,
    pub since: u64,
}

/// One space's reply half of a `pull` RPC.
pub struct SpacePullBundle {
    pub space_id: SpaceId,
    /// The server's current DEK-wrapping epoch for this space, if newer
    /// than what we locally believe.
    pub key_generation: Option<u32>,
    /// Set if the server reports an epoch advance still mid-rewrap.
    pub rewrap_epoch: Option<u32>,
    pub changes: Vec<(String, betterbase_core::WireChange)>,
    pub server_cursor: u64,
}

/// Issues the single multiplexed `pull` RPC; an external collaborator since
/// the wire connection itself is out of scope here.
#[async_trait]
pub trait PullSource: Send + Sync {
    async fn pull(&self, requests: Vec<PullSpaceRequest>, collection: &str) -> Result<Vec<SpacePullBundle>>;
}

/// A request to advance a space's epoch, surfaced by [`MultiSpaceRouter::pull`]
/// for the caller to act on via `betterbase-epoch`. `Interrupted` means the
/// server reports a rewrap in flight (only actionable if we are admin);
/// `Adopt` means the server is already further ahead with no rewrap owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochAdvanceKind {
    Interrupted,
    Adopt,
}

/// One signal the caller must reconcile after a pull, naming the space and
/// the epoch the server reports.
pub struct EpochAdvanceSignal {
    pub space_id: SpaceId,
    pub epoch: u32,
    pub kind: EpochAdvanceKind,
}

/// Result of [`MultiSpaceRouter::pull`].
pub struct PullOutcome {
    pub records: Vec<RemoteRecord>,
    pub failures: Vec<PullFailure>,
    pub epoch_advances: Vec<EpochAdvanceSignal>,
}

/// Outcome of [`MultiSpaceRouter::apply_sync_event`].
pub enum RealtimeOutcome {
    /// `event.seq` is at or behind our cursor; nothing to do.
    Stale,
    /// `event.prev` does not match our cursor; caller must fall back to a
    /// full pull of every collection.
    Gap,
    /// Decryption failed; caller must fall back to a full pull.
    DecryptFailed,
    /// Applied cleanly; cursor has been advanced.
    Applied(Vec<(betterbase_core::CollectionDef, Vec<RemoteRecord>)>),
}

/// Decides whether a space is due for opportunistic epoch rotation, and
/// performs the rotation itself. An external collaborator: the policy
/// (interval, admin role) lives in the space manager.
#[async_trait]
pub trait RotationPolicy: Send + Sync {
    async fn should_rotate(&self, space_id: &SpaceId) -> bool;
    async fn rotate(&self, space_id: &SpaceId) -> Result<()>;
}

/// One WebSocket connection's worth of per-space dispatch.
pub struct MultiSpaceRouter {
    personal_space: SpaceId,
    transports: HashMap<SpaceId, SyncTransport>,
    cursors: Cursors,
    rotation_budget_per_pull: usize,
}

impl MultiSpaceRouter {
    pub fn new(personal_space: SpaceId, personal_transport: SyncTransport) -> Self {
        let mut transports = HashMap::new();
        transports.insert(personal_space.clone(), personal_transport);
        Self { personal_space, transports, cursors: Cursors::new(), rotation_budget_per_pull: 3 }
    }

    /// Lazily register a shared space's transport; a no-op if already present.
    pub fn ensure_shared_transport(&mut self, space_id: SpaceId, transport: SyncTransport) {
        self.transports.entry(space_id).or_insert(transport);
    }

    pub fn has_space(&self, space_id: &SpaceId) -> bool {
        self.transports.contains_key(space_id)
    }

    pub fn active_spaces(&self) -> Vec<SpaceId> {
        self.transports.keys().cloned().collect()
    }

    /// Build the subscription vector for `collections`, one entry per
    /// active space.
    pub fn build_subscription(&self, collections: &[String]) -> Vec<SubscriptionEntry> {
        self.transports
            .keys()
            .map(|space| SubscriptionEntry { space_id: space.clone(), since: self.cursors.max_for_space(space, collections) })
            .collect()
    }

    /// Bump a transport's encryption epoch if it lags the space manager's
    /// authoritative view; the base key is untouched, forward derivation
    /// covers anything already rotated past.
    pub fn refresh_transport_epoch(&mut self, space_id: &SpaceId, authoritative_epoch: u32) {
        if let Some(transport) = self.transports.get_mut(space_id) {
            if transport.current_epoch().map(|e| e < authoritative_epoch).unwrap_or(false) {
                transport.update_encryption_epoch(authoritative_epoch);
            }
        }
    }

    /// Dispatch outbound records grouped by space (`None` defaults to
    /// personal) to each space's transport, concatenating acks.
    pub fn push(&mut self, changes_by_space: HashMap<Option<SpaceId>, Vec<LocalRecord>>, collection: &str, last_server_views: &HashMap<String, Vec<u8>>) -> Vec<OutboundChange> {
        let mut resolved: HashMap<SpaceId, Vec<LocalRecord>> = HashMap::new();
        for (space, records) in changes_by_space {
            let space = space.unwrap_or_else(|| self.personal_space.clone());
            resolved.entry(space).or_default().extend(records);
        }

        let mut acks = Vec::new();
        for (space, records) in resolved {
            if let Some(transport) = self.transports.get_mut(&space) {
                acks.extend(transport.push(collection, &records, last_server_views));
            }
        }
        acks
    }

    /// Issue a single multiplexed pull for `collection` across every active
    /// space and fold the results back in.
    pub async fn pull(&mut self, collection: &str, source: &dyn PullSource) -> Result<PullOutcome> {
        let requests: Vec<PullSpaceRequest> = self
            .transports
            .keys()
            .map(|space| PullSpaceRequest { space_id: space.clone(), since: self.cursors.get(collection, space) })
            .collect();
        let bundles = source.pull(requests, collection).await?;

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut epoch_advances = Vec::new();

        for bundle in bundles {
            let Some(transport) = self.transports.get_mut(&bundle.space_id) else { continue };

            transport.set_prepulled_changes(bundle.changes, bundle.server_cursor);
            let (pulled, pulled_failures) = transport.pull(collection);
            for mut record in pulled {
                record.meta.space_id = Some(bundle.space_id.clone());
                records.push(record);
            }
            failures.extend(pulled_failures);
            self.cursors.set(collection, &bundle.space_id, bundle.server_cursor);

            if let Some(rewrap_epoch) = bundle.rewrap_epoch {
                epoch_advances.push(EpochAdvanceSignal { space_id: bundle.space_id.clone(), epoch: rewrap_epoch, kind: EpochAdvanceKind::Interrupted });
            } else if let Some(new_gen) = bundle.key_generation {
                let lags = transport.current_epoch().map(|current| new_gen > current).unwrap_or(false);
                if lags {
                    epoch_advances.push(EpochAdvanceSignal { space_id: bundle.space_id.clone(), epoch: new_gen, kind: EpochAdvanceKind::Adopt });
                }
            }
        }

        Ok(PullOutcome { records, failures, epoch_advances })
    }

    /// Apply one realtime event addressed to `space_id`.
    pub fn apply_sync_event(&mut self, space_id: &SpaceId, event: &RealtimeEvent, collections: &[betterbase_core::CollectionDef]) -> RealtimeOutcome {
        let names: Vec<String> = collections.iter().map(|c| c.name.clone()).collect();
        let cursor = self.cursors.max_for_space(space_id, &names);

        if event.seq <= cursor {
            return RealtimeOutcome::Stale;
        }
        if event.prev != cursor {
            return RealtimeOutcome::Gap;
        }

        let Some(transport) = self.transports.get_mut(space_id) else {
            return RealtimeOutcome::Gap;
        };

        match transport.decrypt_and_apply(event, collections) {
            Some(applied) => {
                for name in &names {
                    self.cursors.set(name, space_id, event.seq);
                }
                RealtimeOutcome::Applied(applied)
            }
            None => RealtimeOutcome::DecryptFailed,
        }
    }

    /// Walk personal + every shared space (budgeted to at most
    /// [`Self::rotation_budget_per_pull`] rotations) and rotate any space
    /// the policy flags as due.
    pub async fn run_rotation_pass(&self, policy: &dyn RotationPolicy) -> usize {
        let mut ordered = vec![self.personal_space.clone()];
        ordered.extend(self.transports.keys().filter(|s| **s != self.personal_space).cloned());

        let mut rotated = 0;
        for space in ordered {
            if rotated >= self.rotation_budget_per_pull {
                break;
            }
            if policy.should_rotate(&space).await && policy.rotate(&space).await.is_ok() {
                rotated += 1;
            }
        }
        rotated
    }
}
