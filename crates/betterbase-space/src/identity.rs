//! The signing/encryption boundary a space manager drives but never
//! implements itself: UCAN minting, membership entry signatures, and
//! recipient-keyed JWE-style sealing of invitation payloads all require a
//! private key this crate never holds.

use async_trait::async_trait;
use betterbase_core::{Result, SpaceRole};
use serde_json::Value;

/// One space's identity operations, bound to a single signer's private key.
#[async_trait]
pub trait SpaceIdentity: Send + Sync {
    /// This signer's own `did:key`.
    fn did(&self) -> &str;

    /// A human-readable handle embedded in signed entries, if any.
    fn handle(&self) -> Option<&str>;

    /// This signer's public key in JWK form, embedded in signed entries.
    fn public_key_jwk(&self) -> Value;

    /// Sign `message` (a membership entry's canonical signing message).
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Mint a UCAN delegating `role` in a space to `audience_did`, expiring
    /// at `expires_at` (Unix seconds, `None` for no expiry).
    async fn delegate_ucan(&self, audience_did: &str, role: SpaceRole, expires_at: Option<i64>) -> Result<String>;

    /// Mint a self-issued UCAN (`iss == aud == self.did()`), used by a
    /// space's creator to represent their own admin membership.
    async fn self_issued_ucan(&self, role: SpaceRole) -> Result<String>;

    /// Seal `plaintext` to `recipient_public_key` for transport as an
    /// invitation or revocation-notice payload.
    fn seal_for(&self, recipient_public_key: &Value, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Open a payload sealed to this signer's own public key.
    fn open_own(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
