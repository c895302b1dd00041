//! The CBOR-keyed frame envelope carried over the realtime socket.

use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// The four frame kinds a connection exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum FrameKind {
    /// A client-initiated call expecting a response.
    Request = 0,
    /// A server reply to a [`FrameKind::Request`].
    Response = 1,
    /// A server-initiated push with no reply expected.
    Notification = 2,
    /// One part of a chunked response, used for large pull batches.
    Chunk = 3,
}

/// The wire envelope every frame is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Discriminates [`FrameKind`].
    #[serde(rename = "t")]
    pub kind: FrameKind,
    /// Correlation id, matching a request to its response/chunks. Absent on
    /// notifications.
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// RPC method name, present on requests and notifications.
    #[serde(rename = "m", skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Method-specific payload, CBOR-encoded.
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error payload, present only on a failed [`FrameKind::Response`].
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,
}

/// Error shape embedded in a failed response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    /// Machine-readable error code, matching the server's error taxonomy.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl Frame {
    /// Build a request frame for `method` with an already-encoded payload.
    pub fn request(id: u64, method: impl Into<String>, payload: Value) -> Self {
        Frame {
            kind: FrameKind::Request,
            id: Some(id),
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a successful response frame.
    pub fn response(id: u64, payload: Value) -> Self {
        Frame {
            kind: FrameKind::Response,
            id: Some(id),
            method: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failed response frame.
    pub fn error_response(id: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Frame {
            kind: FrameKind::Response,
            id: Some(id),
            method: None,
            payload: None,
            error: Some(FrameError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Build a server-initiated notification frame.
    pub fn notification(method: impl Into<String>, payload: Value) -> Self {
        Frame {
            kind: FrameKind::Notification,
            id: None,
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    /// Build one chunk of a chunked response.
    pub fn chunk(id: u64, payload: Value) -> Self {
        Frame {
            kind: FrameKind::Chunk,
            id: Some(id),
            method: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Serialize this frame to its wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    /// Parse a frame from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }
}
