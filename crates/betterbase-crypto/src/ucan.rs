//! Minimal UCAN JWT parsing: enough to read claims and check expiry.
//!
//! Signature verification of the capability chain happens at the membership
//! log layer, where the issuer's public key is already known from the log
//! itself; this module only handles the generic JWT envelope.

use crate::base64url;
use betterbase_core::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The claim set of a UCAN, with unrecognized fields preserved for callers
/// that need capability/proof chains beyond issuer/audience/expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcanClaims {
    /// Issuer DID.
    pub iss: String,
    /// Audience DID.
    pub aud: String,
    /// Expiry, Unix seconds. `0` or absent means "no expiry".
    #[serde(default)]
    pub exp: i64,
    /// Not-before, Unix seconds.
    #[serde(default)]
    pub nbf: i64,
    /// Every other claim field, kept for capability/fact/proof inspection.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A parsed but not-yet-verified UCAN.
#[derive(Debug, Clone)]
pub struct Ucan {
    /// Decoded JOSE header.
    pub header: Value,
    /// Decoded claim set.
    pub claims: UcanClaims,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
    /// The `header.payload` substring that was signed.
    pub signing_input: String,
}

/// Parse a `header.payload.signature` compact JWT into its parts, without
/// checking the signature.
pub fn parse(token: &str) -> Result<Ucan, SyncError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SyncError::auth("malformed UCAN: expected 3 dot-separated segments"));
    };

    let header: Value = serde_json::from_slice(&base64url::decode(header_b64)?)
        .map_err(|e| SyncError::auth(format!("invalid UCAN header: {e}")))?;
    let claims: UcanClaims = serde_json::from_slice(&base64url::decode(payload_b64)?)
        .map_err(|e| SyncError::auth(format!("invalid UCAN claims: {e}")))?;
    let signature = base64url::decode(sig_b64)?;

    Ok(Ucan {
        header,
        claims,
        signature,
        signing_input: format!("{header_b64}.{payload_b64}"),
    })
}

/// Whether this UCAN has expired, given the current Unix time in seconds.
/// `exp <= 0` means the token never expires.
pub fn is_expired(claims: &UcanClaims, now: i64) -> bool {
    claims.exp > 0 && claims.exp < now
}

/// Whether this UCAN is not yet valid, given the current Unix time in seconds.
pub fn is_not_yet_valid(claims: &UcanClaims, now: i64) -> bool {
    claims.nbf > 0 && claims.nbf > now
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(exp: i64) -> String {
        let header = base64url::encode(br#"{"alg":"ES256","typ":"JWT"}"#);
        let payload = base64url::encode(
            format!(r#"{{"iss":"did:key:zA","aud":"did:key:zB","exp":{exp}}}"#).as_bytes(),
        );
        let sig = base64url::encode(b"fake-signature");
        format!("{header}.{payload}.{sig}")
    }

    #[test]
    fn parses_claims() {
        let ucan = parse(&token_with(9_999_999_999)).unwrap();
        assert_eq!(ucan.claims.iss, "did:key:zA");
        assert_eq!(ucan.claims.aud, "did:key:zB");
    }

    #[test]
    fn detects_expiry() {
        let ucan = parse(&token_with(100)).unwrap();
        assert!(is_expired(&ucan.claims, 200));
        assert!(!is_expired(&ucan.claims, 50));
    }

    #[test]
    fn zero_exp_never_expires() {
        let ucan = parse(&token_with(0)).unwrap();
        assert!(!is_expired(&ucan.claims, i64::MAX));
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(parse("not-a-jwt").is_err());
    }
}
