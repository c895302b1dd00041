//! One [`SyncTransport`] per active space: envelope + DEK lifecycle for
//! that space's push/pull/realtime traffic. Pull consumes changes the
//! router has already fetched over the wire — this type never performs
//! network I/O itself.

use betterbase_core::{CollectionDef, LocalRecord, PullFailure, RecordId, RemoteRecord, RemoteRecordMeta, Result, SpaceId, SyncError, WireChange};
use betterbase_crypto::aead::{self, Aad};
use betterbase_crypto::dek::{generate_dek, peek_epoch, unwrap_dek, wrap_dek};
use betterbase_crypto::envelope::{decode_envelope, encode_envelope, BlobEnvelope};
use betterbase_crypto::epoch::EpochKeyCache;
use betterbase_crypto::padding::{pad_to_bucket, unpad};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Signs and verifies the optional per-record edit-chain entry for
/// collections that opt into it. The CRDT diffing itself is external; this
/// trait only covers the signature boundary.
pub trait EditChainIdentity: Send + Sync {
    /// Produce a signed edit-chain entry for `record_id`, diffing against
    /// `last_server_view` (`None` on the record's first push).
    fn sign_entry(&self, collection: &str, record_id: &str, last_server_view: Option<&[u8]>, crdt: &[u8]) -> String;

    /// Verify a decrypted edit-chain entry against the record's current
    /// CRDT view.
    fn verify_entry(&self, collection: &str, record_id: &str, entry_json: &str, crdt: &[u8]) -> bool;
}

/// Construction parameters for one space's transport.
pub struct SyncTransportConfig {
    pub space_id: SpaceId,
    pub padding_buckets: Vec<usize>,
    /// Present iff this space carries end-to-end encryption (always true
    /// outside of tests).
    pub epoch_key: Option<[u8; 32]>,
    pub base_epoch: u32,
    pub edit_chain_collections: HashSet<String>,
    pub identity: Option<Arc<dyn EditChainIdentity>>,
}

/// One realtime event as delivered by the router, already demultiplexed
/// into per-collection wire changes.
pub struct RealtimeEvent {
    pub seq: u64,
    pub prev: u64,
    pub collection_changes: Vec<(String, WireChange)>,
}

/// Wraps push/pull for exactly one space.
pub struct SyncTransport {
    space_id: SpaceId,
    padding_buckets: Vec<usize>,
    cache: Option<EpochKeyCache>,
    edit_chain_collections: HashSet<String>,
    identity: Option<Arc<dyn EditChainIdentity>>,
    prepulled: Option<(Vec<(String, WireChange)>, u64)>,
}

impl SyncTransport {
    pub fn new(config: SyncTransportConfig) -> Self {
        let cache = config
            .epoch_key
            .map(|key| EpochKeyCache::new(&key, config.base_epoch, config.space_id.as_str().to_string()));
        Self {
            space_id: config.space_id,
            padding_buckets: config.padding_buckets,
            cache,
            edit_chain_collections: config.edit_chain_collections,
            identity: config.identity,
            prepulled: None,
        }
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn current_epoch(&self) -> Option<u32> {
        self.cache.as_ref().map(|c| c.current_epoch())
    }

    /// Advance the encryption epoch independently of the base; monotonic.
    pub fn update_encryption_epoch(&mut self, epoch: u32) {
        if let Some(cache) = self.cache.as_mut() {
            cache.update_encryption_epoch(epoch);
        }
    }

    /// Deposit the wire changes for this space ahead of [`Self::pull`].
    pub fn set_prepulled_changes(&mut self, changes: Vec<(String, WireChange)>, server_cursor: u64) {
        self.prepulled = Some((changes, server_cursor));
    }

    fn encrypt_one(
        &mut self,
        collection: &str,
        record: &LocalRecord,
        last_server_view: Option<&[u8]>,
    ) -> Result<betterbase_core::OutboundChange> {
        if record.deleted {
            return Ok(betterbase_core::OutboundChange {
                id: record.id.clone(),
                blob: None,
                wrapped_dek: None,
                expected_sequence: Some(record.sequence),
            });
        }

        let h = if self.edit_chain_collections.contains(collection) {
            self.identity
                .as_ref()
                .map(|id| id.sign_entry(collection, record.id.as_str(), last_server_view, &record.crdt))
        } else {
            None
        };

        let envelope = BlobEnvelope { c: collection.to_string(), v: record.schema_version, crdt: record.crdt.clone(), h };
        let encoded = encode_envelope(&envelope)?;
        let padded = pad_to_bucket(&encoded, &self.padding_buckets)?;

        let cache = self.cache.as_mut().ok_or_else(|| SyncError::internal("transport has no epoch config"))?;
        let current_epoch = cache.current_epoch();
        let kek = cache.get_kek(current_epoch)?;

        let dek = generate_dek();
        let ciphertext = aead::encrypt(&padded, &dek, &Aad::Record { space_id: self.space_id.as_str(), record_id: record.id.as_str() })?;
        let wrapped = wrap_dek(&dek, &kek, current_epoch)?;

        Ok(betterbase_core::OutboundChange {
            id: record.id.clone(),
            blob: Some(ciphertext),
            wrapped_dek: Some(wrapped.to_vec()),
            expected_sequence: Some(record.sequence),
        })
    }

    /// Encrypt `records` for push. Per-record failures are dropped from the
    /// batch rather than aborting it. `last_server_views` carries the
    /// baseline CRDT view for records in an edit-chain collection, keyed by
    /// record id string.
    pub fn push(
        &mut self,
        collection: &str,
        records: &[LocalRecord],
        last_server_views: &HashMap<String, Vec<u8>>,
    ) -> Vec<betterbase_core::OutboundChange> {
        records
            .iter()
            .filter_map(|record| {
                let last_view = last_server_views.get(record.id.as_str()).map(|v| v.as_slice());
                match self.encrypt_one(collection, record, last_view) {
                    Ok(change) => Some(change),
                    Err(error) => {
                        tracing::warn!(record_id = %record.id, %error, "dropping record during push encryption");
                        None
                    }
                }
            })
            .collect()
    }

    fn decrypt_one(&mut self, collection: &str, change: &WireChange) -> Result<RemoteRecord> {
        if change.deleted || change.blob.is_none() {
            return Ok(RemoteRecord {
                id: change.id.clone(),
                collection: collection.to_string(),
                version: 0,
                crdt: Vec::new(),
                deleted: true,
                sequence: change.sequence,
                meta: RemoteRecordMeta { space_id: Some(self.space_id.clone()), ..Default::default() },
            });
        }

        let blob = change.blob.as_ref().expect("checked above");
        let wrapped = change.wrapped_dek.as_ref().ok_or_else(|| SyncError::decrypt("missing wrapped DEK"))?;
        let epoch = peek_epoch(wrapped)?;

        let cache = self.cache.as_mut().ok_or_else(|| SyncError::internal("transport has no epoch config"))?;
        let kek = cache.get_kek(epoch)?;
        let (dek, _) = unwrap_dek(wrapped, &kek)?;

        let plaintext = aead::decrypt(blob, &dek, &Aad::Record { space_id: self.space_id.as_str(), record_id: change.id.as_str() })?;
        let unpadded = unpad(&plaintext, &self.padding_buckets)?;
        let envelope = decode_envelope(&unpadded)?;

        if envelope.c != collection {
            return Err(SyncError::decrypt(format!(
                "envelope collection {} does not match requested collection {collection}",
                envelope.c
            )));
        }

        let edit_chain_valid = envelope.h.as_ref().map(|h| {
            self.identity
                .as_ref()
                .map(|id| id.verify_entry(collection, change.id.as_str(), h, &envelope.crdt))
                .unwrap_or(false)
        });

        Ok(RemoteRecord {
            id: change.id.clone(),
            collection: envelope.c,
            version: envelope.v,
            crdt: envelope.crdt.clone(),
            deleted: false,
            sequence: change.sequence,
            meta: RemoteRecordMeta {
                space_id: Some(self.space_id.clone()),
                edit_chain_valid,
                last_server_view: Some(envelope.crdt),
            },
        })
    }

    /// Transform whatever was deposited by [`Self::set_prepulled_changes`]
    /// for `collection` into decrypted records. A per-record decrypt
    /// failure is collected as a [`PullFailure`], never aborts the batch.
    pub fn pull(&mut self, collection: &str) -> (Vec<RemoteRecord>, Vec<PullFailure>) {
        let Some((changes, _cursor)) = &self.prepulled else {
            return (Vec::new(), Vec::new());
        };
        let changes: Vec<(String, WireChange)> = changes.iter().filter(|(c, _)| c == collection).cloned().collect();

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (c, change) in &changes {
            match self.decrypt_one(c, change) {
                Ok(record) => records.push(record),
                Err(error) => failures.push(PullFailure { id: change.id.clone(), reason: error.to_string() }),
            }
        }
        (records, failures)
    }

    /// Decrypt every change in a realtime event; on any single failure the
    /// whole event is rejected so the caller can fall back to a full pull.
    pub fn decrypt_and_apply(&mut self, event: &RealtimeEvent, collections: &[CollectionDef]) -> Option<Vec<(CollectionDef, Vec<RemoteRecord>)>> {
        let mut grouped: HashMap<String, Vec<RemoteRecord>> = HashMap::new();
        for (collection, change) in &event.collection_changes {
            match self.decrypt_one(collection, change) {
                Ok(record) => grouped.entry(collection.clone()).or_default().push(record),
                Err(error) => {
                    tracing::warn!(%error, "realtime event decrypt failed, caller should fall back to a full pull");
                    return None;
                }
            }
        }
        Some(
            collections
                .iter()
                .filter_map(|def| grouped.remove(&def.name).map(|records| (def.clone(), records)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use betterbase_core::SpaceId;

    fn transport(epoch_key: [u8; 32]) -> SyncTransport {
        SyncTransport::new(SyncTransportConfig {
            space_id: SpaceId::from("space-1"),
            padding_buckets: betterbase_crypto::padding::DEFAULT_PADDING_BUCKETS.to_vec(),
            epoch_key: Some(epoch_key),
            base_epoch: 1,
            edit_chain_collections: HashSet::new(),
            identity: None,
        })
    }

    fn record(id: &str, deleted: bool) -> LocalRecord {
        LocalRecord {
            id: RecordId::from(id),
            collection: "notes".to_string(),
            schema_version: 1,
            crdt: vec![1, 2, 3],
            sequence: 7,
            deleted,
            space_id: SpaceId::from("space-1"),
        }
    }

    #[test]
    fn push_then_pull_round_trips_a_record() {
        let mut transport = transport([3u8; 32]);
        let changes = transport.push("notes", &[record("rec-1", false)], &HashMap::new());
        assert_eq!(changes.len(), 1);

        let wire = WireChange {
            id: changes[0].id.clone(),
            blob: changes[0].blob.clone(),
            wrapped_dek: changes[0].wrapped_dek.clone(),
            sequence: 1,
            deleted: false,
        };
        transport.set_prepulled_changes(vec![("notes".to_string(), wire)], 1);
        let (records, failures) = transport.pull("notes");
        assert!(failures.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].crdt, vec![1, 2, 3]);
    }

    #[test]
    fn deleted_record_pushes_as_tombstone() {
        let mut transport = transport([4u8; 32]);
        let changes = transport.push("notes", &[record("rec-1", true)], &HashMap::new());
        assert_eq!(changes.len(), 1);
        assert!(changes[0].blob.is_none());
        assert!(changes[0].wrapped_dek.is_none());
    }

    #[test]
    fn pull_rejects_wrong_collection() {
        let mut transport = transport([5u8; 32]);
        let changes = transport.push("notes", &[record("rec-1", false)], &HashMap::new());
        let wire = WireChange {
            id: changes[0].id.clone(),
            blob: changes[0].blob.clone(),
            wrapped_dek: changes[0].wrapped_dek.clone(),
            sequence: 1,
            deleted: false,
        };
        transport.set_prepulled_changes(vec![("tasks".to_string(), wire)], 1);
        let (records, failures) = transport.pull("tasks");
        assert!(records.is_empty());
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn decrypt_and_apply_fails_closed_on_any_bad_record() {
        let mut transport = transport([6u8; 32]);
        let good = transport.push("notes", &[record("rec-1", false)], &HashMap::new());
        let bad_wire = WireChange {
            id: RecordId::from("rec-2"),
            blob: Some(vec![9, 9, 9]),
            wrapped_dek: Some(vec![9; 44]),
            sequence: 2,
            deleted: false,
        };
        let good_wire = WireChange {
            id: good[0].id.clone(),
            blob: good[0].blob.clone(),
            wrapped_dek: good[0].wrapped_dek.clone(),
            sequence: 1,
            deleted: false,
        };
        let event = RealtimeEvent {
            seq: 2,
            prev: 0,
            collection_changes: vec![("notes".to_string(), good_wire), ("notes".to_string(), bad_wire)],
        };
        let defs = vec![CollectionDef { name: "notes".to_string(), edit_chain_enabled: false }];
        assert!(transport.decrypt_and_apply(&event, &defs).is_none());
    }
}
