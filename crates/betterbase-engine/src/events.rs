//! The asynchronous-callback boundary, replaced with one typed `mpsc`
//! channel per event kind rather than a closure-capturing callback stack.

use betterbase_core::SpaceId;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub pushed: usize,
    pub pulled_collections: usize,
    pub newly_quarantined: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct InvitationEvent {
    pub imported_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEventKind {
    Heartbeat,
    Left,
    Stale,
}

#[derive(Debug, Clone)]
pub struct PresenceEvent {
    pub space_id: SpaceId,
    pub peer_did: String,
    pub kind: PresenceEventKind,
}

/// The receiving half of every channel a [`crate::SyncEngine`] emits on.
/// Handed back once from [`crate::SyncEngine::create`].
pub struct EngineEvents {
    pub on_sync: mpsc::UnboundedReceiver<SyncEvent>,
    pub on_invitation: mpsc::UnboundedReceiver<InvitationEvent>,
    pub on_revoked: mpsc::UnboundedReceiver<SpaceId>,
    pub on_presence: mpsc::UnboundedReceiver<PresenceEvent>,
    pub on_open: mpsc::UnboundedReceiver<()>,
    pub on_close: mpsc::UnboundedReceiver<()>,
}

pub(crate) struct EventSenders {
    pub on_sync: mpsc::UnboundedSender<SyncEvent>,
    pub on_invitation: mpsc::UnboundedSender<InvitationEvent>,
    pub on_revoked: mpsc::UnboundedSender<SpaceId>,
    pub on_presence: mpsc::UnboundedSender<PresenceEvent>,
    pub on_open: mpsc::UnboundedSender<()>,
    pub on_close: mpsc::UnboundedSender<()>,
}

impl EventSenders {
    pub(crate) fn new() -> (Self, EngineEvents) {
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let (invitation_tx, invitation_rx) = mpsc::unbounded_channel();
        let (revoked_tx, revoked_rx) = mpsc::unbounded_channel();
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        (
            Self {
                on_sync: sync_tx,
                on_invitation: invitation_tx,
                on_revoked: revoked_tx,
                on_presence: presence_tx,
                on_open: open_tx,
                on_close: close_tx,
            },
            EngineEvents {
                on_sync: sync_rx,
                on_invitation: invitation_rx,
                on_revoked: revoked_rx,
                on_presence: presence_rx,
                on_open: open_rx,
                on_close: close_rx,
            },
        )
    }
}
