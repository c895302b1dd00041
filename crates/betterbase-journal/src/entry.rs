//! Membership log entry payload: signing message, JSON shape, and
//! ciphertext/hash bookkeeping for one chain position.

use betterbase_core::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const MEMBERSHIP_PREFIX: &str = "betterbase:membership:v1\0";

/// The four membership log entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Admin delegates a role to an invitee.
    #[serde(rename = "d")]
    Delegation,
    /// Invitee accepts a delegation.
    #[serde(rename = "a")]
    Accepted,
    /// Invitee declines a delegation.
    #[serde(rename = "x")]
    Declined,
    /// Admin revokes a delegation.
    #[serde(rename = "r")]
    Revoked,
}

impl EntryType {
    fn as_str(self) -> &'static str {
        match self {
            EntryType::Delegation => "d",
            EntryType::Accepted => "a",
            EntryType::Declined => "x",
            EntryType::Revoked => "r",
        }
    }

    fn from_str(s: &str) -> Result<Self, SyncError> {
        match s {
            "d" => Ok(EntryType::Delegation),
            "a" => Ok(EntryType::Accepted),
            "x" => Ok(EntryType::Declined),
            "r" => Ok(EntryType::Revoked),
            other => Err(SyncError::invalid_membership(format!(
                "invalid entry type: {other}"
            ))),
        }
    }
}

/// The plaintext payload stored (AEAD-encrypted) at one log position.
#[derive(Debug, Clone)]
pub struct EntryPayload {
    pub ucan: String,
    pub entry_type: EntryType,
    pub signature: Vec<u8>,
    pub signer_public_key: Value,
    pub epoch: Option<u32>,
    pub mailbox_id: Option<String>,
    pub recipient_public_key: Option<Value>,
    pub signer_handle: Option<String>,
    pub recipient_handle: Option<String>,
}

/// Build the canonical message a membership entry's signature covers.
pub fn build_signing_message(
    entry_type: EntryType,
    space_id: &str,
    signer_did: &str,
    ucan: &str,
    signer_handle: &str,
    recipient_handle: &str,
) -> Vec<u8> {
    format!(
        "{MEMBERSHIP_PREFIX}{}\0{space_id}\0{signer_did}\0{ucan}\0{signer_handle}\0{recipient_handle}",
        entry_type.as_str(),
    )
    .into_bytes()
}

/// Serialize a payload to its canonical JSON wire shape.
pub fn serialize(entry: &EntryPayload) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("u".into(), Value::String(entry.ucan.clone()));
    obj.insert("t".into(), Value::String(entry.entry_type.as_str().into()));
    obj.insert(
        "s".into(),
        Value::String(betterbase_crypto::base64url::encode(&entry.signature)),
    );
    obj.insert("p".into(), entry.signer_public_key.clone());
    if let Some(epoch) = entry.epoch {
        obj.insert("e".into(), Value::from(epoch));
    }
    if let Some(mailbox) = &entry.mailbox_id {
        obj.insert("m".into(), Value::String(mailbox.clone()));
    }
    if let Some(jwk) = &entry.recipient_public_key {
        obj.insert("k".into(), jwk.clone());
    }
    if let Some(handle) = &entry.signer_handle {
        obj.insert("n".into(), Value::String(handle.clone()));
    }
    if let Some(handle) = &entry.recipient_handle {
        obj.insert("rn".into(), Value::String(handle.clone()));
    }
    Value::Object(obj).to_string()
}

const MAX_HANDLE_LEN: usize = 320;

fn read_handle(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| s.len() <= MAX_HANDLE_LEN)
        .map(|s| s.to_string())
}

/// Parse a payload from its canonical JSON wire shape.
pub fn parse(payload: &str) -> Result<EntryPayload, SyncError> {
    let parsed: Value =
        serde_json::from_str(payload).map_err(|e| SyncError::invalid_membership(e.to_string()))?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| SyncError::invalid_membership("expected JSON object"))?;

    let ucan = obj
        .get("u")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::invalid_membership("missing u field"))?
        .to_string();
    let entry_type = EntryType::from_str(
        obj.get("t")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::invalid_membership("missing t field"))?,
    )?;
    let signature = betterbase_crypto::base64url::decode(
        obj.get("s")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::invalid_membership("missing s field"))?,
    )?;
    let signer_public_key = obj
        .get("p")
        .cloned()
        .ok_or_else(|| SyncError::invalid_membership("missing p field"))?;

    Ok(EntryPayload {
        ucan,
        entry_type,
        signature,
        signer_public_key,
        epoch: obj.get("e").and_then(|v| v.as_u64()).map(|v| v as u32),
        mailbox_id: obj.get("m").and_then(|v| v.as_str()).map(String::from),
        recipient_public_key: obj.get("k").cloned(),
        signer_handle: read_handle(obj.get("n")),
        recipient_handle: read_handle(obj.get("rn")),
    })
}

/// SHA-256 of ciphertext bytes, used as an entry's `entry_hash`.
pub fn entry_hash(ciphertext: &[u8]) -> [u8; 32] {
    Sha256::digest(ciphertext).into()
}
