//! Error type shared by every client operation.

use std::time::Duration;

/// Failure of a [`MeshClient`](crate::MeshClient) operation.
///
/// Connection failures are split by when they happen: [`MeshError::Connection`]
/// for transport errors at any point, [`MeshError::Handshake`] for a socket
/// that opened but never completed the session handshake, and
/// [`MeshError::ConnectionClosed`] for a peer that hung up mid-session.
/// [`MeshError::is_connection_loss`] groups all three.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The caller passed an argument the client refuses before any network I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The response did not have the fields or layout the action requires.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A vertex buffer did not hold exactly `expected` values.
    #[error("vertex buffer holds {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    /// The server refused the uploaded motion data.
    #[error("upload rejected by server: {msg}")]
    UploadRejected { msg: String },
    /// The server could not evaluate the requested frame.
    #[error("forward failed: {msg}")]
    ForwardFailed { msg: String },
    /// The server could not return the face topology.
    #[error("get_faces failed: {msg}")]
    GetTopologyFailed { msg: String },
    /// The WebSocket connection or handshake failed.
    #[error("websocket connection failed: {0}")]
    Connection(Box<tokio_tungstenite::tungstenite::Error>),
    /// The server did not complete the session handshake.
    #[error("session handshake failed: {0}")]
    Handshake(String),
    /// The peer closed the connection mid-session.
    #[error("connection closed by server")]
    ConnectionClosed,
    /// No correlated response arrived within the configured request timeout.
    #[error("timed out after {0:?} waiting for response")]
    Timeout(Duration),
    /// The client was closed, explicitly or by a disconnecting failure.
    #[error("client is closed")]
    Closed,
    /// A binary frame could not be decoded.
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::CodecError),
    /// Reading a motion file from disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// Whether the underlying channel is unusable after this error.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Handshake(_) | Self::ConnectionClosed
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MeshError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
