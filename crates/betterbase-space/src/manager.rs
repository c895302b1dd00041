//! Space lifecycle orchestration: create, invite, accept, decline, the
//! membership cache, startup activation, and rotation scheduling.

use crate::directory::AccountsCache;
use crate::identity::SpaceIdentity;
use crate::record::{CachedMember, SpaceRecord, SpaceStatus};
use crate::server::{AccountsDirectory, ServerApi, SpaceStorage};
use async_lock::Mutex as AsyncMutex;
use betterbase_core::{Result, SpaceId, SpaceRole, SyncError};
use betterbase_epoch::{
    advance_epoch, remove_member as drive_member_removal, verify_revocation, ActiveRemovalGuard, EpochState, EpochTransport, ReencryptedPayload, RevocationSideEffects,
    RevocationVerdict,
};
use betterbase_journal::chain::replay;
use betterbase_journal::entry::{build_signing_message, entry_hash};
use betterbase_journal::{parse_entry, payload_crypto, serialize_entry, verify_entry, AppendOutcome, Chain, EntryPayload, EntryType, LogEntry};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Default opportunistic rotation interval: 30 days.
pub const DEFAULT_ROTATION_INTERVAL_SECS: i64 = 30 * 24 * 60 * 60;

fn parse_role(s: &str) -> Option<SpaceRole> {
    match s {
        "admin" => Some(SpaceRole::Admin),
        "write" => Some(SpaceRole::Write),
        "read" => Some(SpaceRole::Read),
        _ => None,
    }
}

/// Mirrors [`betterbase_journal::chain::append_with_retry`]'s CAS-retry
/// algorithm for a server submit step that is async rather than a sync
/// closure.
async fn append_with_retry_async(chain: &mut Chain, ciphertext: Vec<u8>, server: &dyn ServerApi, space_id: &SpaceId) -> Result<u64> {
    let mut attempt_entry = chain.next_entry(ciphertext);

    for attempt in 0..2 {
        let expected_version = chain.last_seq();
        match server.append_entry(space_id, &attempt_entry, expected_version).await? {
            AppendOutcome::Accepted { chain_seq } => {
                chain.push(attempt_entry);
                return Ok(chain_seq);
            }
            AppendOutcome::HashChainBroken { seq } => {
                return Err(SyncError::HashChainBroken { seq });
            }
            AppendOutcome::Retry { server_seq } => {
                if attempt == 1 {
                    return Err(SyncError::VersionConflict { expected: attempt_entry.chain_seq, actual: server_seq });
                }
                let ciphertext = attempt_entry.ciphertext;
                attempt_entry = LogEntry {
                    chain_seq: server_seq + 1,
                    prev_hash: chain.last_hash(),
                    entry_hash: entry_hash(&ciphertext),
                    ciphertext,
                };
            }
        }
    }
    unreachable!("loop always returns within two attempts")
}

/// Owns every activated space's in-memory key/role/epoch state and drives
/// the full create/invite/accept/decline/refresh lifecycle described above.
pub struct SpaceManager {
    server: Arc<dyn ServerApi>,
    storage: Arc<dyn SpaceStorage>,
    directory: AccountsCache,
    identity: Arc<dyn SpaceIdentity>,
    epoch_transport: Arc<dyn EpochTransport>,

    records: Mutex<HashMap<SpaceId, SpaceRecord>>,
    keys: Mutex<HashMap<SpaceId, Zeroizing<[u8; 32]>>>,
    chains: Mutex<HashMap<SpaceId, Chain>>,
    epoch_states: Mutex<HashMap<SpaceId, EpochState>>,

    check_invitations_lock: AsyncMutex<()>,
    refresh_locks: Mutex<HashMap<SpaceId, Arc<AsyncMutex<()>>>>,
    removal_guard: ActiveRemovalGuard,
}

impl SpaceManager {
    pub fn new(
        server: Arc<dyn ServerApi>,
        storage: Arc<dyn SpaceStorage>,
        directory: Arc<dyn AccountsDirectory>,
        identity: Arc<dyn SpaceIdentity>,
        epoch_transport: Arc<dyn EpochTransport>,
    ) -> Self {
        Self {
            server,
            storage,
            directory: AccountsCache::new(directory),
            identity,
            epoch_transport,
            records: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashMap::new()),
            chains: Mutex::new(HashMap::new()),
            epoch_states: Mutex::new(HashMap::new()),
            check_invitations_lock: AsyncMutex::new(()),
            refresh_locks: Mutex::new(HashMap::new()),
            removal_guard: ActiveRemovalGuard::new(),
        }
    }

    pub fn has_space(&self, space_id: &SpaceId) -> bool {
        self.records.lock().contains_key(space_id)
    }

    pub fn get_space_epoch(&self, space_id: &SpaceId) -> Option<u32> {
        self.records.lock().get(space_id).map(|r| r.epoch)
    }

    pub fn get_space_role(&self, space_id: &SpaceId) -> Option<SpaceRole> {
        self.records.lock().get(space_id).map(|r| r.role)
    }

    pub fn record(&self, space_id: &SpaceId) -> Option<SpaceRecord> {
        self.records.lock().get(space_id).cloned()
    }

    pub fn removal_guard(&self) -> &ActiveRemovalGuard {
        &self.removal_guard
    }

    fn space_key(&self, space_id: &SpaceId) -> Result<[u8; 32]> {
        let keys = self.keys.lock();
        let key = keys.get(space_id).ok_or_else(|| SyncError::internal(format!("no space key cached for {space_id}")))?;
        Ok(**key)
    }

    async fn persist(&self, record: &SpaceRecord) -> Result<()> {
        self.storage.save(record).await
    }

    async fn ensure_chain_loaded(&self, space_id: &SpaceId) -> Result<()> {
        if self.chains.lock().contains_key(space_id) {
            return Ok(());
        }
        let entries = self.server.list_entries(space_id, 0).await?;
        self.chains.lock().insert(space_id.clone(), Chain::from_entries(entries));
        Ok(())
    }

    /// Seed this space's [`EpochState`] from its cached record/key the first
    /// time something needs to drive an epoch advance.
    fn ensure_epoch_state_loaded(&self, space_id: &SpaceId) -> Result<()> {
        if self.epoch_states.lock().contains_key(space_id) {
            return Ok(());
        }
        let record = self.records.lock().get(space_id).cloned().ok_or_else(|| SyncError::not_found(format!("no record for {space_id}")))?;
        let key = self.space_key(space_id)?;
        let state = EpochState::new(space_id.as_str(), record.epoch, &key, record.epoch_advanced_at.unwrap_or(0));
        self.epoch_states.lock().insert(space_id.clone(), state);
        Ok(())
    }

    /// Fold an (possibly advanced) [`EpochState`] back into `records`/`keys`,
    /// the maps the rest of this file reads epoch/key from.
    async fn commit_epoch_state(&self, space_id: &SpaceId, state: &EpochState) -> Result<()> {
        let existing = self.records.lock().get(space_id).cloned();
        if let Some(mut record) = existing {
            record.epoch = state.current_epoch();
            record.epoch_advanced_at = Some(state.advanced_at());
            self.persist(&record).await?;
            self.records.lock().insert(space_id.clone(), record);
        }
        self.keys.lock().insert(space_id.clone(), Zeroizing::new(*state.key()));
        Ok(())
    }

    /// Append `ciphertext` to `space_id`'s chain, taking the chain out of
    /// the map for the duration of the (async) server round trip so no
    /// lock is held across an await point.
    async fn append(&self, space_id: &SpaceId, ciphertext: Vec<u8>) -> Result<u64> {
        let mut chain = self.chains.lock().remove(space_id).ok_or_else(|| SyncError::internal("membership chain not loaded"))?;
        let result = append_with_retry_async(&mut chain, ciphertext, self.server.as_ref(), space_id).await;
        self.chains.lock().insert(space_id.clone(), chain);
        result
    }

    /// `space.create`, a signed type-`d` creator entry at seq 1, and local
    /// activation.
    pub async fn create_space(&self, name: String, space_key: [u8; 32], now: i64) -> Result<SpaceId> {
        let public_key = self.identity.public_key_jwk();
        let space_id = self.server.create_space(&public_key).await?;

        let ucan = self.identity.self_issued_ucan(SpaceRole::Admin).await?;
        let handle = self.identity.handle().unwrap_or("").to_string();
        let message = build_signing_message(EntryType::Delegation, space_id.as_str(), self.identity.did(), &ucan, &handle, &handle);
        let signature = self.identity.sign(&message);
        let payload = EntryPayload {
            ucan,
            entry_type: EntryType::Delegation,
            signature,
            signer_public_key: public_key.clone(),
            epoch: None,
            mailbox_id: None,
            recipient_public_key: None,
            signer_handle: Some(handle.clone()),
            recipient_handle: Some(handle),
        };
        let ciphertext = payload_crypto::encrypt(&serialize_entry(&payload), &space_key, space_id.as_str(), 1)?;

        self.chains.lock().insert(space_id.clone(), Chain::from_entries(vec![]));
        self.keys.lock().insert(space_id.clone(), Zeroizing::new(space_key));
        let seq = self.append(&space_id, ciphertext).await?;

        let record = SpaceRecord {
            space_id: space_id.clone(),
            name,
            status: SpaceStatus::Active,
            role: SpaceRole::Admin,
            ucan_chain: payload.ucan.clone(),
            root_public_key: serde_json::to_vec(&public_key).unwrap_or_default(),
            epoch: 0,
            epoch_advanced_at: Some(now),
            members: Vec::new(),
            membership_log_seq: seq,
            metadata_version: 0,
            rewrap_epoch: None,
            server_invitation_id: None,
        };
        self.persist(&record).await?;
        self.records.lock().insert(space_id.clone(), record);
        Ok(space_id)
    }

    /// Delegate a UCAN to `handle`, append a signed type-`d` entry embedding
    /// their mailbox/public key, and mail a sealed invitation payload.
    pub async fn invite(&self, space_id: &SpaceId, handle: &str, role: SpaceRole, now: i64, ucan_ttl_secs: Option<i64>) -> Result<()> {
        let recipient = self.directory.lookup(handle).await?;
        let audience_did = betterbase_crypto::jwk::encode_did_key_from_jwk(&recipient.public_key)?;
        let expires_at = ucan_ttl_secs.map(|ttl| now + ttl);
        let ucan = self.identity.delegate_ucan(&audience_did, role, expires_at).await?;

        let signer_handle = self.identity.handle().unwrap_or("").to_string();
        let message = build_signing_message(EntryType::Delegation, space_id.as_str(), self.identity.did(), &ucan, &signer_handle, handle);
        let signature = self.identity.sign(&message);
        let payload = EntryPayload {
            ucan: ucan.clone(),
            entry_type: EntryType::Delegation,
            signature,
            signer_public_key: self.identity.public_key_jwk(),
            epoch: None,
            mailbox_id: Some(recipient.mailbox_id.clone()),
            recipient_public_key: Some(recipient.public_key.clone()),
            signer_handle: Some(signer_handle),
            recipient_handle: Some(handle.to_string()),
        };

        self.ensure_chain_loaded(space_id).await?;
        let space_key = self.space_key(space_id)?;
        let next_seq = self.chains.lock().get(space_id).map(|c| c.last_seq() + 1).unwrap_or(1);
        let ciphertext = payload_crypto::encrypt(&serialize_entry(&payload), &space_key, space_id.as_str(), next_seq)?;
        self.append(space_id, ciphertext).await?;

        let space_name = self.records.lock().get(space_id).map(|r| r.name.clone()).unwrap_or_default();
        let invitation_payload = serde_json::json!({
            "space_id": space_id.as_str(),
            "space_key": betterbase_crypto::base64url::encode(&space_key),
            "ucan_chain": ucan,
            "metadata": { "name": space_name, "role": role.to_string() },
        });
        let plaintext = serde_json::to_vec(&invitation_payload).map_err(|e| SyncError::serialization(e.to_string()))?;
        let sealed = self.identity.seal_for(&recipient.public_key, &plaintext)?;
        self.server.create_invitation(&recipient.mailbox_id, sealed).await?;
        Ok(())
    }

    /// Accept an invited space: signed type-`a` entry, activate locally,
    /// best-effort delete the server invitation.
    pub async fn accept(&self, space_id: &SpaceId, now: i64) -> Result<()> {
        let record = self.records.lock().get(space_id).cloned().ok_or_else(|| SyncError::not_found(format!("no invited record for {space_id}")))?;
        if record.status != SpaceStatus::Invited {
            return Err(SyncError::internal(format!("space {space_id} is not in invited state")));
        }

        let handle = self.identity.handle().unwrap_or("").to_string();
        let message = build_signing_message(EntryType::Accepted, space_id.as_str(), self.identity.did(), &record.ucan_chain, &handle, &handle);
        let signature = self.identity.sign(&message);
        let payload = EntryPayload {
            ucan: record.ucan_chain.clone(),
            entry_type: EntryType::Accepted,
            signature,
            signer_public_key: self.identity.public_key_jwk(),
            epoch: None,
            mailbox_id: None,
            recipient_public_key: None,
            signer_handle: Some(handle.clone()),
            recipient_handle: Some(handle),
        };

        self.ensure_chain_loaded(space_id).await?;
        let space_key = self.space_key(space_id)?;
        let next_seq = self.chains.lock().get(space_id).map(|c| c.last_seq() + 1).unwrap_or(1);
        let ciphertext = payload_crypto::encrypt(&serialize_entry(&payload), &space_key, space_id.as_str(), next_seq)?;
        self.append(space_id, ciphertext).await?;

        let mut updated = record.clone();
        updated.status = SpaceStatus::Active;
        updated.epoch_advanced_at = updated.epoch_advanced_at.or(Some(now));
        self.persist(&updated).await?;
        self.records.lock().insert(space_id.clone(), updated);

        if let Some(invitation_id) = &record.server_invitation_id {
            let _ = self.server.delete_invitation(invitation_id).await;
        }
        Ok(())
    }

    /// Decline an invited space: signed type-`x` entry, delete the local
    /// record, best-effort delete the server invitation.
    pub async fn decline(&self, space_id: &SpaceId) -> Result<()> {
        let record = self.records.lock().get(space_id).cloned().ok_or_else(|| SyncError::not_found(format!("no invited record for {space_id}")))?;

        let handle = self.identity.handle().unwrap_or("").to_string();
        let message = build_signing_message(EntryType::Declined, space_id.as_str(), self.identity.did(), &record.ucan_chain, &handle, &handle);
        let signature = self.identity.sign(&message);
        let payload = EntryPayload {
            ucan: record.ucan_chain.clone(),
            entry_type: EntryType::Declined,
            signature,
            signer_public_key: self.identity.public_key_jwk(),
            epoch: None,
            mailbox_id: None,
            recipient_public_key: None,
            signer_handle: Some(handle.clone()),
            recipient_handle: Some(handle),
        };

        self.ensure_chain_loaded(space_id).await?;
        let space_key = self.space_key(space_id)?;
        let next_seq = self.chains.lock().get(space_id).map(|c| c.last_seq() + 1).unwrap_or(1);
        let ciphertext = payload_crypto::encrypt(&serialize_entry(&payload), &space_key, space_id.as_str(), next_seq)?;
        self.append(space_id, ciphertext).await?;

        self.records.lock().remove(space_id);
        self.keys.lock().remove(space_id);
        self.chains.lock().remove(space_id);
        self.epoch_states.lock().remove(space_id);
        let _ = self.storage.delete(space_id).await;

        if let Some(invitation_id) = &record.server_invitation_id {
            let _ = self.server.delete_invitation(invitation_id).await;
        }
        Ok(())
    }

    /// Drain the invitation mailbox: revocation notices go through
    /// [`verify_revocation`]; everything else is parsed as an invitation
    /// payload and recorded as an invited space. Single-flight across
    /// concurrent callers.
    pub async fn check_invitations(&self, side_effects: &dyn RevocationSideEffects, now: i64) -> Result<usize> {
        let _permit = self.check_invitations_lock.lock().await;

        let invitations = self.server.list_invitations().await?;
        let mut imported = 0;

        for inv in invitations {
            let Ok(plaintext) = self.identity.open_own(&inv.ciphertext) else { continue };
            let Ok(value) = serde_json::from_slice::<Value>(&plaintext) else { continue };

            if value.get("type").and_then(Value::as_str) == Some("revocation") {
                if let Some(space_id_str) = value.get("space_id").and_then(Value::as_str) {
                    let space_id = SpaceId::from(space_id_str);
                    let notice_epoch = value.get("epoch").and_then(Value::as_u64).unwrap_or(0) as u32;
                    let (known, local_epoch) = {
                        let records = self.records.lock();
                        match records.get(&space_id) {
                            Some(r) if r.status != SpaceStatus::Removed => (true, r.epoch),
                            _ => (false, 0),
                        }
                    };
                    let verdict = verify_revocation(&self.removal_guard, side_effects, &space_id, known, local_epoch, notice_epoch).await;
                    if verdict == RevocationVerdict::Confirmed {
                        let existing = self.records.lock().get(&space_id).cloned();
                        if let Some(mut record) = existing {
                            record.status = SpaceStatus::Removed;
                            self.persist(&record).await?;
                            self.records.lock().insert(space_id.clone(), record);
                        }
                    }
                }
                let _ = self.server.delete_invitation(&inv.id).await;
                continue;
            }

            let Some(space_id_str) = value.get("space_id").and_then(Value::as_str) else { continue };
            let space_id = SpaceId::from(space_id_str);
            let existing_status = self.records.lock().get(&space_id).map(|r| r.status);
            if matches!(existing_status, Some(SpaceStatus::Active) | Some(SpaceStatus::Invited)) {
                continue;
            }
            let Some(space_key_b64) = value.get("space_key").and_then(Value::as_str) else { continue };
            let Ok(space_key_bytes) = betterbase_crypto::base64url::decode(space_key_b64) else { continue };
            if space_key_bytes.len() != 32 {
                continue;
            }
            let Some(ucan_chain) = value.get("ucan_chain").and_then(Value::as_str) else { continue };
            let name = value.pointer("/metadata/name").and_then(Value::as_str).unwrap_or("").to_string();
            let role = value.pointer("/metadata/role").and_then(Value::as_str).and_then(parse_role).unwrap_or(SpaceRole::Write);

            let mut key = [0u8; 32];
            key.copy_from_slice(&space_key_bytes);
            self.keys.lock().insert(space_id.clone(), Zeroizing::new(key));

            let record = SpaceRecord {
                space_id: space_id.clone(),
                name,
                status: SpaceStatus::Invited,
                role,
                ucan_chain: ucan_chain.to_string(),
                root_public_key: Vec::new(),
                epoch: 0,
                epoch_advanced_at: Some(now),
                members: Vec::new(),
                membership_log_seq: 0,
                metadata_version: 0,
                rewrap_epoch: None,
                server_invitation_id: Some(inv.id.clone()),
            };
            self.persist(&record).await?;
            self.records.lock().insert(space_id.clone(), record);
            imported += 1;
        }
        Ok(imported)
    }

    /// Single-flight per space. Probes for new entries since the cached
    /// seq; only a full re-fetch-and-replay when something moved.
    pub async fn refresh_members(&self, space_id: &SpaceId, now: i64) -> Result<Vec<CachedMember>> {
        let lock = {
            let mut locks = self.refresh_locks.lock();
            locks.entry(space_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        let _permit = lock.lock().await;

        let cached_seq = self.records.lock().get(space_id).map(|r| r.membership_log_seq).unwrap_or(0);
        let probe = self.server.list_entries(space_id, cached_seq).await?;
        if probe.is_empty() && cached_seq > 0 {
            return Ok(self.records.lock().get(space_id).map(|r| r.members.clone()).unwrap_or_default());
        }

        let entries = if cached_seq == 0 { probe } else { self.server.list_entries(space_id, 0).await? };
        let space_key = self.space_key(space_id)?;

        let mut payloads = Vec::with_capacity(entries.len());
        for entry in &entries {
            let Ok(plaintext) = payload_crypto::decrypt(&entry.ciphertext, &space_key, space_id.as_str(), entry.chain_seq) else { continue };
            let Ok(payload) = parse_entry(&plaintext) else { continue };
            let sig_valid = verify_entry(&payload, space_id.as_str());
            payloads.push((payload, sig_valid));
        }
        let views = replay(&payloads, now);
        let cached: Vec<CachedMember> = views.iter().map(CachedMember::from).collect();

        let last_seq = entries.last().map(|e| e.chain_seq).unwrap_or(cached_seq);
        self.chains.lock().insert(space_id.clone(), Chain::from_entries(entries));

        let existing = self.records.lock().get(space_id).cloned();
        if let Some(mut record) = existing {
            record.members = cached.clone();
            record.membership_log_seq = last_seq;
            self.persist(&record).await?;
            self.records.lock().insert(space_id.clone(), record);
        }
        Ok(cached)
    }

    pub async fn get_members(&self, space_id: &SpaceId, now: i64) -> Result<Vec<CachedMember>> {
        self.refresh_members(space_id, now).await
    }

    /// Activate every persisted `active` space record on startup, backfilling
    /// a missing `epoch_advanced_at` to `now` rather than assuming its
    /// rotation interval has already elapsed.
    pub async fn initialize_from_spaces(&self, now: i64) -> Result<Vec<SpaceId>> {
        let records = self.storage.load_all().await?;
        let mut activated = Vec::new();

        for mut record in records {
            if record.status != SpaceStatus::Active {
                continue;
            }
            if record.epoch_advanced_at.is_none() {
                record.epoch_advanced_at = Some(now);
                self.persist(&record).await?;
            }
            activated.push(record.space_id.clone());
            self.records.lock().insert(record.space_id.clone(), record);
        }
        Ok(activated)
    }

    /// True iff `space_id` is ours to rotate (admin) and its last advance is
    /// at least `interval_secs` old.
    pub fn should_rotate_space(&self, space_id: &SpaceId, now: i64, interval_secs: i64) -> bool {
        let records = self.records.lock();
        let Some(record) = records.get(space_id) else { return false };
        if !record.role.is_admin() {
            return false;
        }
        let Some(advanced_at) = record.epoch_advanced_at else { return false };
        now - advanced_at >= interval_secs
    }

    /// Drive the admin-side removal sequence for `member_did`: revoke their
    /// UCANs, advance the epoch with `set_min_key_generation` (no grace
    /// period), rewrap every DEK, then hand `remaining_members` to
    /// `side_effects` for re-encryption and re-append. The epoch state is
    /// taken out of the map for the duration of the call, mirroring
    /// [`Self::append`], and put back (with whatever it advanced to) even if
    /// a later step in the sequence fails.
    pub async fn remove_member(&self, space_id: &SpaceId, member_did: &str, side_effects: &dyn RevocationSideEffects, remaining_members: Vec<ReencryptedPayload>, now: i64) -> Result<()> {
        self.ensure_epoch_state_loaded(space_id)?;
        let mut state = self.epoch_states.lock().remove(space_id).ok_or_else(|| SyncError::internal("epoch state not loaded"))?;

        let outcome = drive_member_removal(&self.removal_guard, self.epoch_transport.as_ref(), side_effects, &mut state, member_did, remaining_members, now).await;
        let commit = self.commit_epoch_state(space_id, &state).await;
        self.epoch_states.lock().insert(space_id.clone(), state);

        outcome?;
        commit?;
        Ok(())
    }

    /// Opportunistic rotation: advance the epoch without the forced
    /// second-epoch guarantee `remove_member` needs. Called by
    /// [`Self::should_rotate_space`]'s caller once it returns true.
    pub async fn rotate_space_key(&self, space_id: &SpaceId, now: i64) -> Result<u32> {
        self.ensure_epoch_state_loaded(space_id)?;
        let mut state = self.epoch_states.lock().remove(space_id).ok_or_else(|| SyncError::internal("epoch state not loaded"))?;

        let outcome = advance_epoch(self.epoch_transport.as_ref(), &mut state, false, now).await;
        let commit = self.commit_epoch_state(space_id, &state).await;
        self.epoch_states.lock().insert(space_id.clone(), state);

        let new_epoch = outcome?;
        commit?;
        Ok(new_epoch)
    }
}
