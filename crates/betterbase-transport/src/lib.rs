//! The wire protocol: frame envelope, RPC method payloads, close codes, and
//! the [`connection::RealtimeConnection`] boundary to the actual socket.

#![forbid(unsafe_code)]

pub mod close;
pub mod connection;
pub mod frame;
pub mod rpc;

pub use close::CloseReason;
pub use connection::RealtimeConnection;
pub use frame::{Frame, FrameError, FrameKind};
