//! P-256 JWK <-> key conversions and `did:key` encoding.

use crate::base64url;
use betterbase_core::SyncError;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{EncodedPoint, PublicKey};
use serde::{Deserialize, Serialize};
use signature::{Signer, Verifier};

/// Minimal EC JWK, covering exactly the fields the membership log embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `"EC"`.
    pub kty: String,
    /// Curve name, always `"P-256"`.
    pub crv: String,
    /// X coordinate, base64url.
    pub x: String,
    /// Y coordinate, base64url.
    pub y: String,
}

impl Jwk {
    /// Encode a P-256 public key as a JWK.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let x = point.x().expect("uncompressed point always has x");
        let y = point.y().expect("uncompressed point always has y");
        Jwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: base64url::encode(x),
            y: base64url::encode(y),
        }
    }

    /// Decode this JWK back into a P-256 verifying key.
    pub fn to_public_key(&self) -> Result<VerifyingKey, SyncError> {
        if self.kty != "EC" || self.crv != "P-256" {
            return Err(SyncError::invalid_membership(format!(
                "unsupported JWK kty/crv: {}/{}",
                self.kty, self.crv
            )));
        }
        let x = base64url::decode(&self.x)?;
        let y = base64url::decode(&self.y)?;
        let point = EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            false,
        );
        let public_key = PublicKey::from_encoded_point(&point);
        if public_key.is_none().into() {
            return Err(SyncError::invalid_membership("invalid P-256 point"));
        }
        Ok(VerifyingKey::from(public_key.unwrap()))
    }

    /// Parse a JWK out of a generic JSON value, as stored in membership
    /// log entries (`p`/`k` fields).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SyncError> {
        serde_json::from_value(value.clone())
            .map_err(|e| SyncError::invalid_membership(format!("invalid JWK: {e}")))
    }
}

/// Multicodec varint prefix for a P-256 public key (`p256-pub`, 0x1200).
const P256_MULTICODEC_PREFIX: [u8; 2] = [0x80, 0x24];

/// Encode a `did:key:z...` identifier from a P-256 public key JWK.
pub fn encode_did_key_from_jwk(jwk: &serde_json::Value) -> Result<String, SyncError> {
    let jwk = Jwk::from_json(jwk)?;
    let key = jwk.to_public_key()?;
    let compressed = key.to_encoded_point(true);

    let mut bytes = Vec::with_capacity(2 + compressed.len());
    bytes.extend_from_slice(&P256_MULTICODEC_PREFIX);
    bytes.extend_from_slice(compressed.as_bytes());

    Ok(format!("did:key:z{}", bs58::encode(bytes).into_string()))
}

/// Sign `message` with a P-256 signing key, producing a fixed 64-byte
/// ECDSA signature.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = signing_key.sign(message);
    sig.to_bytes().to_vec()
}

/// Verify a 64-byte ECDSA signature against a JWK-encoded public key.
pub fn verify(signer_public_key: &serde_json::Value, message: &[u8], signature: &[u8]) -> bool {
    let Ok(jwk) = Jwk::from_json(signer_public_key) else {
        return false;
    };
    let Ok(public_key) = jwk.to_public_key() else {
        return false;
    };
    let Ok(sig) = Signature::try_from(signature) else {
        return false;
    };
    public_key.verify(message, &sig).is_ok()
}
