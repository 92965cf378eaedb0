//! Message channel to the mesh service.
//!
//! [`Channel`] is the seam between the client and its transport: send a
//! frame, receive the next frame, close. Request/response correlation is a
//! provided method on top of those three, so every transport gets the same
//! matching and timeout rules. [`WsChannel`] is the production transport:
//! protobuf frames in binary WebSocket messages.

use std::time::Duration;

use frames::{Frame, SESSION_CONNECTED};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{MeshError, Result};

#[async_trait::async_trait]
pub trait Channel: Send {
    /// Send one frame.
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Receive the next frame, skipping transport-level control messages.
    async fn recv(&mut self) -> Result<Frame>;

    /// Close the channel. Closing an already closed channel is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Send `request` and wait for its terminal response.
    ///
    /// Frames whose `parent_id` is not the request id, and non-terminal
    /// frames, are discarded. When `timeout` elapses a cancel frame for the
    /// request is sent and [`MeshError::Timeout`] returned.
    async fn request(&mut self, request: &Frame, timeout: Option<Duration>) -> Result<Frame> {
        self.send(request).await?;

        let Some(limit) = timeout else {
            return self.await_reply(&request.id).await;
        };
        let outcome = tokio::time::timeout(limit, self.await_reply(&request.id)).await;
        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                if let Err(e) = self.send(&Frame::cancel(request)).await {
                    warn!(error = %e, syscall = %request.syscall, "cancel frame not sent");
                }
                Err(MeshError::Timeout(limit))
            }
        }
    }

    /// Receive frames until the terminal response to `request_id` arrives.
    async fn await_reply(&mut self, request_id: &str) -> Result<Frame> {
        loop {
            let frame = self.recv().await?;
            if frame.parent_id.as_deref() != Some(request_id) {
                debug!(
                    syscall = %frame.syscall,
                    parent_id = ?frame.parent_id,
                    "discarding uncorrelated frame"
                );
                continue;
            }
            if !frame.status.is_terminal() {
                continue;
            }
            return Ok(frame);
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket transport carrying protobuf frames.
pub struct WsChannel {
    stream: WsStream,
}

impl WsChannel {
    /// Open the WebSocket and wait for the server's `session:connected` frame.
    ///
    /// Both steps share `config.connect_timeout`.
    ///
    /// # Errors
    ///
    /// [`MeshError::Connection`] when the address cannot be resolved or the
    /// upgrade fails, [`MeshError::Handshake`] when the session handshake
    /// does not complete in time.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(config.max_message_bytes))
            .max_frame_size(Some(config.max_message_bytes));
        let url = config.ws_url();

        let handshake = async {
            let (stream, _) = connect_async_with_config(url.as_str(), Some(ws_config), true).await?;
            let mut channel = Self { stream };
            let connected = channel.wait_connected().await?;
            debug!(data = %connected.data, "session handshake complete");
            Ok::<_, MeshError>(channel)
        };

        tokio::time::timeout(config.connect_timeout, handshake)
            .await
            .map_err(|_| {
                MeshError::Handshake(format!(
                    "no {SESSION_CONNECTED} from {} within {:?}",
                    config.address(),
                    config.connect_timeout
                ))
            })?
    }

    async fn wait_connected(&mut self) -> Result<Frame> {
        loop {
            match self.recv().await {
                Ok(frame) if frame.syscall == SESSION_CONNECTED => return Ok(frame),
                Ok(frame) => debug!(syscall = %frame.syscall, "frame before handshake ignored"),
                Err(MeshError::ConnectionClosed) => {
                    return Err(MeshError::Handshake(
                        "server closed the connection before the handshake".to_owned(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frames::encode_frame(frame);
        self.stream.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame> {
        loop {
            let Some(msg) = self.stream.next().await else {
                return Err(MeshError::ConnectionClosed);
            };
            match msg? {
                Message::Binary(bytes) => return Ok(frames::decode_frame(&bytes)?),
                Message::Close(_) => return Err(MeshError::ConnectionClosed),
                _ => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
