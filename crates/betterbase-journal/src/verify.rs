//! Signature verification for membership log entries.

use crate::entry::{build_signing_message, EntryPayload, EntryType};
use betterbase_crypto::jwk::encode_did_key_from_jwk;
use betterbase_crypto::ucan;

/// Verify an entry's signature and, for self-issued UCANs, the UCAN's own
/// JWT signature. Returns `false` (not an error) for any verification
/// failure — a bad entry is skipped during replay, not treated as fatal.
pub fn verify_entry(entry: &EntryPayload, space_id: &str) -> bool {
    let Ok(parsed) = ucan::parse(&entry.ucan) else {
        return false;
    };

    let expected_signer_did = match entry.entry_type {
        EntryType::Delegation | EntryType::Revoked => &parsed.claims.iss,
        EntryType::Accepted | EntryType::Declined => &parsed.claims.aud,
    };

    let Ok(signer_did) = encode_did_key_from_jwk(&entry.signer_public_key) else {
        return false;
    };
    if signer_did != *expected_signer_did {
        return false;
    }

    let message = build_signing_message(
        entry.entry_type,
        space_id,
        &signer_did,
        &entry.ucan,
        entry.signer_handle.as_deref().unwrap_or(""),
        entry.recipient_handle.as_deref().unwrap_or(""),
    );
    if !betterbase_crypto::jwk::verify(&entry.signer_public_key, &message, &entry.signature) {
        return false;
    }

    if parsed.claims.iss == parsed.claims.aud {
        let ucan_signing_input = parsed.signing_input.as_bytes();
        if !betterbase_crypto::jwk::verify(
            &entry.signer_public_key,
            ucan_signing_input,
            &parsed.signature,
        ) {
            return false;
        }
    }

    true
}
