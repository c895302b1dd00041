//! The boundary to a single realtime connection. The actual socket
//! (WebSocket in production, an in-memory channel in tests) is an external
//! collaborator behind this trait.

use crate::frame::Frame;
use async_trait::async_trait;
use betterbase_core::SyncError;

/// A single duplex realtime connection, carrying [`Frame`]s.
#[async_trait]
pub trait RealtimeConnection: Send + Sync {
    /// Send one frame.
    async fn send(&self, frame: Frame) -> Result<(), SyncError>;

    /// Receive the next frame, or `None` once the connection closes cleanly.
    async fn recv(&self) -> Result<Option<Frame>, SyncError>;

    /// Close the connection with an application close code.
    async fn close(&self, code: u16, reason: &str) -> Result<(), SyncError>;
}

/// An in-memory connection pair for tests, backed by bounded channels.
pub mod test_support {
    use super::*;
    use tokio::sync::Mutex;
    use tokio::sync::mpsc;

    /// One end of an in-memory [`RealtimeConnection`] pair.
    pub struct ChannelConnection {
        tx: mpsc::Sender<Frame>,
        rx: Mutex<mpsc::Receiver<Frame>>,
    }

    impl ChannelConnection {
        /// Build a connected pair: frames sent on one end arrive on the other.
        pub fn pair(capacity: usize) -> (Self, Self) {
            let (tx_a, rx_b) = mpsc::channel(capacity);
            let (tx_b, rx_a) = mpsc::channel(capacity);
            (
                ChannelConnection { tx: tx_a, rx: Mutex::new(rx_a) },
                ChannelConnection { tx: tx_b, rx: Mutex::new(rx_b) },
            )
        }
    }

    #[async_trait]
    impl RealtimeConnection for ChannelConnection {
        async fn send(&self, frame: Frame) -> Result<(), SyncError> {
            self.tx
                .send(frame)
                .await
                .map_err(|_| SyncError::network("peer channel closed"))
        }

        async fn recv(&self) -> Result<Option<Frame>, SyncError> {
            Ok(self.rx.lock().await.recv().await)
        }

        async fn close(&self, _code: u16, _reason: &str) -> Result<(), SyncError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ChannelConnection;
    use super::*;
    use serde_cbor::value::to_value;

    #[tokio::test]
    async fn frames_flow_between_the_pair() {
        let (a, b) = ChannelConnection::pair(4);
        let payload = to_value(1u32).unwrap();
        a.send(Frame::request(1, "push", payload)).await.unwrap();
        let received = b.recv().await.unwrap().unwrap();
        assert_eq!(received.method.as_deref(), Some("push"));
    }
}
