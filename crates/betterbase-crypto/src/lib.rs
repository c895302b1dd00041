//! End-to-end encryption primitives: AEAD envelopes, epoch key derivation,
//! DEK wrapping, padding, and the identity machinery (JWK/did:key, UCAN)
//! layered on top of them.

#![forbid(unsafe_code)]

pub mod aead;
pub mod base64url;
pub mod dek;
pub mod envelope;
pub mod epoch;
pub mod jwk;
pub mod padding;
pub mod rewrap;
pub mod ucan;

pub use aead::{decrypt, encrypt, Aad};
pub use dek::{generate_dek, peek_epoch, unwrap_dek, wrap_dek, Dek};
pub use envelope::{decode_envelope, encode_envelope, BlobEnvelope};
pub use epoch::{channel_key_for, derive_forward, EpochKeyCache, MAX_EPOCH_GAP};
pub use jwk::{encode_did_key_from_jwk, Jwk};
pub use padding::{pad_to_bucket, unpad, DEFAULT_PADDING_BUCKETS};
pub use rewrap::{rewrap_deks, RewrapInput, RewrapOutput};
pub use ucan::{parse as parse_ucan, Ucan, UcanClaims};
