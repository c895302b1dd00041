//! Hash-chained append-only membership log: one client's view of a space's
//! log plus the compare-and-swap append protocol.

use crate::entry::{entry_hash, EntryPayload, EntryType};
use betterbase_core::SyncError;

/// One committed position in the chain.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub chain_seq: u64,
    pub prev_hash: Option<[u8; 32]>,
    pub entry_hash: [u8; 32],
    /// Encrypted payload bytes, as stored server-side.
    pub ciphertext: Vec<u8>,
}

/// A client-side reader/appender over a space's membership log, holding the
/// locally known tail.
pub struct Chain {
    entries: Vec<LogEntry>,
}

impl Chain {
    /// Build a chain from entries already fetched from the server, in
    /// ascending `chain_seq` order.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Chain { entries }
    }

    /// The `expected_version` CAS argument for the next append: the chain
    /// seq of the last known entry, or 0 if empty.
    pub fn last_seq(&self) -> u64 {
        self.entries.last().map(|e| e.chain_seq).unwrap_or(0)
    }

    /// The `prev_hash` the next entry must chain from.
    pub fn last_hash(&self) -> Option<[u8; 32]> {
        self.entries.last().map(|e| e.entry_hash)
    }

    /// Build the next [`LogEntry`] for `ciphertext`, ready to submit via
    /// `membership.append`.
    pub fn next_entry(&self, ciphertext: Vec<u8>) -> LogEntry {
        LogEntry {
            chain_seq: self.last_seq() + 1,
            prev_hash: self.last_hash(),
            entry_hash: entry_hash(&ciphertext),
            ciphertext,
        }
    }

    /// Locally record an entry the server accepted.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// All entries currently known.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

/// Append-result classification the caller uses to decide whether to retry.
pub enum AppendOutcome {
    /// The server accepted the append at this seq.
    Accepted { chain_seq: u64 },
    /// A plain CAS race: the server has a different last seq, but the
    /// hash chain itself is intact. Retry exactly once.
    Retry { server_seq: u64 },
    /// The hash chain itself diverged. Never retried.
    HashChainBroken { seq: u64 },
}

/// Reconcile a server append response against what we expected, classifying
/// it for the caller. `server_entry_hash` is the hash of the entry the
/// server already holds at `server_seq`, if any.
pub fn classify_conflict(
    expected_seq: u64,
    server_seq: u64,
    server_prev_hash_matches: bool,
) -> AppendOutcome {
    if server_seq == expected_seq {
        return AppendOutcome::Accepted { chain_seq: expected_seq };
    }
    if !server_prev_hash_matches {
        return AppendOutcome::HashChainBroken { seq: server_seq };
    }
    AppendOutcome::Retry { server_seq }
}

/// Append `ciphertext` to `chain` with a single CAS retry on a plain
/// version conflict; a hash-chain violation is surfaced immediately as
/// [`SyncError::HashChainBroken`].
///
/// `submit` performs the actual `membership.append` RPC and returns the
/// outcome the server reported.
pub fn append_with_retry(
    chain: &mut Chain,
    ciphertext: Vec<u8>,
    mut submit: impl FnMut(&LogEntry) -> Result<AppendOutcome, SyncError>,
) -> Result<u64, SyncError> {
    let mut attempt_entry = chain.next_entry(ciphertext);

    for attempt in 0..2 {
        match submit(&attempt_entry)? {
            AppendOutcome::Accepted { chain_seq } => {
                chain.push(attempt_entry);
                return Ok(chain_seq);
            }
            AppendOutcome::HashChainBroken { seq } => {
                return Err(SyncError::HashChainBroken { seq });
            }
            AppendOutcome::Retry { server_seq } => {
                if attempt == 1 {
                    return Err(SyncError::VersionConflict {
                        expected: attempt_entry.chain_seq,
                        actual: server_seq,
                    });
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

/// A member's reconciled status after replaying the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Pending,
    Joined,
    Declined,
    Revoked,
}

/// One member's reconciled view after [`replay`].
#[derive(Debug, Clone)]
pub struct MemberView {
    pub audience_did: String,
    pub status: MemberStatus,
    pub ucan: String,
    pub handle: Option<String>,
}

/// Replay every (decrypted, parsed) payload in chain order into a member
/// view, applying the precedence `revoked > declined > joined > pending`.
/// Entries whose signature does not verify, or whose UCAN has expired, are
/// skipped (not fatal).
pub fn replay(payloads: &[(EntryPayload, bool)], now: i64) -> Vec<MemberView> {
    use std::collections::HashMap;

    let mut delegations: HashMap<String, EntryPayload> = HashMap::new();
    let mut accepted: HashMap<String, ()> = HashMap::new();
    let mut declined: HashMap<String, ()> = HashMap::new();
    let mut revoked: HashMap<String, ()> = HashMap::new();

    for (payload, sig_valid) in payloads {
        if !*sig_valid {
            continue;
        }
        let Ok(ucan) = betterbase_crypto::ucan::parse(&payload.ucan) else {
            continue;
        };
        if betterbase_crypto::ucan::is_expired(&ucan.claims, now) {
            continue;
        }

        match payload.entry_type {
            EntryType::Delegation => {
                delegations.insert(ucan.claims.aud.clone(), payload.clone());
            }
            EntryType::Accepted => {
                accepted.insert(ucan.claims.aud.clone(), ());
            }
            EntryType::Declined => {
                declined.insert(ucan.claims.aud.clone(), ());
            }
            EntryType::Revoked => {
                revoked.insert(ucan.claims.aud.clone(), ());
            }
        }
    }

    delegations
        .into_iter()
        .map(|(audience_did, payload)| {
            let self_issued = {
                let issuer = betterbase_crypto::ucan::parse(&payload.ucan)
                    .map(|u| u.claims.iss == u.claims.aud)
                    .unwrap_or(false);
                issuer
            };
            let status = if revoked.contains_key(&audience_did) {
                MemberStatus::Revoked
            } else if declined.contains_key(&audience_did) {
                MemberStatus::Declined
            } else if accepted.contains_key(&audience_did) || self_issued {
                MemberStatus::Joined
            } else {
                MemberStatus::Pending
            };
            MemberView {
                audience_did,
                status,
                ucan: payload.ucan.clone(),
                handle: payload.recipient_handle.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_seq_starting_at_one() {
        let chain = Chain::from_entries(vec![]);
        let entry = chain.next_entry(vec![1, 2, 3]);
        assert_eq!(entry.chain_seq, 1);
        assert!(entry.prev_hash.is_none());
    }

    #[test]
    fn prev_hash_links_to_prior_entry() {
        let mut chain = Chain::from_entries(vec![]);
        let first = chain.next_entry(vec![1]);
        let first_hash = first.entry_hash;
        chain.push(first);

        let second = chain.next_entry(vec![2]);
        assert_eq!(second.chain_seq, 2);
        assert_eq!(second.prev_hash, Some(first_hash));
    }

    #[test]
    fn retries_once_on_plain_conflict_then_succeeds() {
        let mut chain = Chain::from_entries(vec![]);
        let mut calls = 0;
        let result = append_with_retry(&mut chain, vec![9], |entry| {
            calls += 1;
            if calls == 1 {
                Ok(AppendOutcome::Retry { server_seq: 1 })
            } else {
                Ok(AppendOutcome::Accepted { chain_seq: entry.chain_seq })
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn hash_chain_violation_is_permanent() {
        let mut chain = Chain::from_entries(vec![]);
        let result = append_with_retry(&mut chain, vec![9], |_| {
            Ok(AppendOutcome::HashChainBroken { seq: 1 })
        });
        assert!(matches!(result, Err(SyncError::HashChainBroken { seq: 1 })));
    }

    #[test]
    fn second_conflict_surfaces_version_conflict() {
        let mut chain = Chain::from_entries(vec![]);
        let result = append_with_retry(&mut chain, vec![9], |_| {
            Ok(AppendOutcome::Retry { server_seq: 5 })
        });
        assert!(matches!(result, Err(SyncError::VersionConflict { .. })));
    }
}
