//! Encrypted ephemeral pub/sub for one space's `event`/`presence`
//! channels. Messages are never persisted; a restart drops all replay
//! state along with them, which is safe because the channel key itself
//! is non-persistent (see [`betterbase_crypto::epoch::channel_key_for`]).

use crate::envelope::{decode, encode, ChannelEnvelope};
use crate::replay::ReplayWindow;
use betterbase_core::{Result, SpaceId};
use betterbase_crypto::aead::{self, Aad};
use parking_lot::Mutex;
use std::collections::HashMap;

/// `presence` and `event` are the two channel names the AAD distinguishes;
/// kept as an enum so a typo can't silently cross-wire the two streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Presence,
    Event,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Presence => "presence",
            Channel::Event => "event",
        }
    }
}

/// One per space; holds the replay window for each of that space's two
/// channels.
pub struct EventManager {
    space_id: SpaceId,
    windows: Mutex<HashMap<&'static str, ReplayWindow>>,
    own_seq: Mutex<HashMap<&'static str, u64>>,
}

impl EventManager {
    pub fn new(space_id: SpaceId) -> Self {
        Self { space_id, windows: Mutex::new(HashMap::new()), own_seq: Mutex::new(HashMap::new()) }
    }

    /// Encrypt `payload` for `channel`, allocating the next sequence
    /// number this instance has sent on that channel.
    pub fn publish(&self, channel: Channel, channel_key: &[u8; 32], sender_did: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        let seq = {
            let mut seqs = self.own_seq.lock();
            let next = seqs.entry(channel.as_str()).or_insert(0);
            *next += 1;
            *next
        };
        let envelope = ChannelEnvelope { sender_did: sender_did.to_string(), seq, payload };
        let encoded = encode(&envelope)?;
        aead::encrypt(&encoded, channel_key, &Aad::Channel { space_id: self.space_id.as_str(), channel: channel.as_str() })
    }

    /// Decrypt a received channel message. Returns `Ok(None)` for a
    /// message outside the replay window (already seen, or older than the
    /// sender's last accepted sequence) rather than an error, since a
    /// replay is an expected occurrence on a multiplexed connection, not
    /// a failure.
    pub fn receive(&self, channel: Channel, channel_key: &[u8; 32], ciphertext: &[u8]) -> Result<Option<(String, Vec<u8>)>> {
        let plaintext = aead::decrypt(ciphertext, channel_key, &Aad::Channel { space_id: self.space_id.as_str(), channel: channel.as_str() })?;
        let envelope = decode(&plaintext)?;

        let accepted = self.windows.lock().entry(channel.as_str()).or_default().accept(&envelope.sender_did, envelope.seq);
        if !accepted {
            return Ok(None);
        }
        Ok(Some((envelope.sender_did, envelope.payload)))
    }
}
