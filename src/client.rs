//! `MeshClient`: one long-lived session with a body-mesh evaluation service.
//!
//! LIFECYCLE
//! =========
//! `Connected` → upload → `Connected(uploaded)` → forward* / get_faces* →
//! `Closed`. The session becomes `Closed` on [`MeshClient::close`], on a
//! server failure whose action policy is [`OnFailure::Disconnect`], or when
//! the channel is lost. Every operation on a closed client fails with
//! [`MeshError::Closed`].
//!
//! Operations take `&mut self`, so one client never has two requests in
//! flight.

use std::borrow::Cow;
use std::path::Path;

use tracing::{Instrument, Span, debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{Channel, WsChannel};
use crate::config::{ClientConfig, ResponseEncoding};
use crate::decode::{self, Face, Vertex};
use crate::error::{MeshError, Result};
use crate::ops::{MAX_FRAME_INDEX, OnFailure, Operation, Request};
use crate::reply::{self, Reply};

/// File name sent with [`MeshClient::upload`].
pub const DEFAULT_FILE_NAME: &str = "motion";

/// Per-instance session state. Only the owning client mutates it.
#[derive(Debug)]
struct Session {
    id: Uuid,
    address: String,
    encoding: ResponseEncoding,
    request_timeout: Option<std::time::Duration>,
    upload_completed: bool,
    last_vertices: Option<Vec<Vertex>>,
    faces: Option<Vec<Face>>,
}

pub struct MeshClient<C = WsChannel> {
    channel: Option<C>,
    session: Session,
    span: Span,
}

impl MeshClient<WsChannel> {
    /// Connect to the service described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the WebSocket cannot be opened or the session handshake
    /// does not complete.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_span(config, None).await
    }

    /// Connect using a caller-supplied logging span instead of the default
    /// per-instance one.
    ///
    /// # Errors
    ///
    /// Same as [`MeshClient::connect`].
    pub async fn connect_with_span(config: ClientConfig, span: Option<Span>) -> Result<Self> {
        let session_id = Uuid::new_v4();
        let span = span.unwrap_or_else(|| default_span(session_id, &config));

        let channel = match WsChannel::connect(&config).instrument(span.clone()).await {
            Ok(channel) => channel,
            Err(e) => {
                span.in_scope(|| error!(error = %e, server = %config.address(), "connect failed"));
                return Err(e);
            }
        };
        span.in_scope(|| info!(server = %config.address(), "connected"));

        Ok(Self::build(channel, session_id, &config, span))
    }
}

impl<C: Channel> MeshClient<C> {
    /// Wrap an already connected channel.
    #[must_use]
    pub fn with_channel(channel: C, config: &ClientConfig, span: Option<Span>) -> Self {
        let session_id = Uuid::new_v4();
        let span = span.unwrap_or_else(|| default_span(session_id, config));
        Self::build(channel, session_id, config, span)
    }

    fn build(channel: C, id: Uuid, config: &ClientConfig, span: Span) -> Self {
        Self {
            channel: Some(channel),
            session: Session {
                id,
                address: config.address(),
                encoding: config.encoding,
                request_timeout: config.request_timeout,
                upload_completed: false,
                last_vertices: None,
                faces: None,
            },
            span,
        }
    }

    /// Upload motion data under [`DEFAULT_FILE_NAME`].
    ///
    /// # Errors
    ///
    /// See [`MeshClient::upload_named`].
    pub async fn upload(&mut self, body_motion: &[u8]) -> Result<u64> {
        self.upload_named(DEFAULT_FILE_NAME, body_motion).await
    }

    /// Upload a file from disk, named after its file stem.
    ///
    /// # Errors
    ///
    /// [`MeshError::Io`] when the file cannot be read, otherwise see
    /// [`MeshClient::upload_named`].
    pub async fn upload_file(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_stem()
            .map_or(Cow::Borrowed(DEFAULT_FILE_NAME), |s| s.to_string_lossy());
        self.upload_named(&file_name, &data).await
    }

    /// Upload a motion sequence and return its frame count.
    ///
    /// The upload response is always structured, whatever the negotiated
    /// encoding.
    ///
    /// # Errors
    ///
    /// - [`MeshError::InvalidArgument`] for empty data, before any I/O.
    /// - [`MeshError::UploadRejected`] when the server refuses the data;
    ///   the connection is closed.
    /// - [`MeshError::Protocol`] for a malformed response.
    pub async fn upload_named(&mut self, file_name: &str, body_motion: &[u8]) -> Result<u64> {
        if body_motion.is_empty() {
            return Err(MeshError::InvalidArgument("motion data is empty".to_owned()));
        }
        let span = self.span.clone();
        async {
            let request = Request::Upload {
                file_name,
                file_data: body_motion,
            };
            let reply = self.exchange(&request).await?;
            let num_frames = match reply {
                Reply::Structured(map) => {
                    decode::frame_count_from_value(reply::field(&map, "num_frames")?)?
                }
                Reply::Failed(msg) => return Err(self.fail(Operation::Upload, msg).await),
                Reply::Binary(_) => {
                    return Err(MeshError::Protocol(
                        "upload response must be structured, got binary".to_owned(),
                    ));
                }
            };
            self.session.upload_completed = true;
            info!(num_frames, bytes = body_motion.len(), "motion uploaded");
            Ok(num_frames)
        }
        .instrument(span)
        .await
    }

    /// Evaluate one frame of the uploaded motion into mesh vertices.
    ///
    /// The index is not range-checked against the upload; the server is
    /// authoritative.
    ///
    /// # Errors
    ///
    /// - [`MeshError::InvalidArgument`] when `|frame_idx|` exceeds
    ///   [`MAX_FRAME_INDEX`], before any I/O.
    /// - [`MeshError::ForwardFailed`] when the server reports a failure;
    ///   the connection stays open.
    /// - [`MeshError::ShapeMismatch`] when the buffer is not 6890 × 3.
    /// - [`MeshError::Protocol`] for a malformed response or one whose shape
    ///   does not match the negotiated encoding.
    pub async fn forward(&mut self, frame_idx: i64) -> Result<Vec<Vertex>> {
        if frame_idx.unsigned_abs() > MAX_FRAME_INDEX.unsigned_abs() {
            return Err(MeshError::InvalidArgument(format!(
                "frame index {frame_idx} is not exactly representable on the wire"
            )));
        }
        let span = self.span.clone();
        async {
            if !self.session.upload_completed {
                debug!(frame_idx, "forward before a successful upload in this session");
            }
            let reply = self.exchange(&Request::Forward { frame_idx }).await?;
            let vertices = match (self.session.encoding, reply) {
                (_, Reply::Failed(msg)) => {
                    return Err(self.fail(Operation::Forward, msg).await);
                }
                (ResponseEncoding::Bytes, Reply::Binary(bytes)) => {
                    decode::vertices_from_f16_le(&bytes)?
                }
                (ResponseEncoding::Structured, Reply::Structured(map)) => {
                    decode::vertices_from_value(reply::field(&map, "verts")?)?
                }
                (encoding, other) => {
                    return Err(encoding_mismatch(Operation::Forward, encoding, &other));
                }
            };
            debug!(frame_idx, vertices = vertices.len(), "frame evaluated");
            self.session.last_vertices = Some(vertices.clone());
            Ok(vertices)
        }
        .instrument(span)
        .await
    }

    /// Fetch the mesh's face topology.
    ///
    /// # Errors
    ///
    /// - [`MeshError::GetTopologyFailed`] when the server reports a failure;
    ///   the connection is closed.
    /// - [`MeshError::Protocol`] for a malformed response or one whose shape
    ///   does not match the negotiated encoding.
    pub async fn get_topology(&mut self) -> Result<Vec<Face>> {
        let span = self.span.clone();
        async {
            let reply = self.exchange(&Request::GetTopology).await?;
            let faces = match (self.session.encoding, reply) {
                (_, Reply::Failed(msg)) => {
                    return Err(self.fail(Operation::GetFaces, msg).await);
                }
                (ResponseEncoding::Bytes, Reply::Binary(bytes)) => {
                    decode::faces_from_i32_le(&bytes)?
                }
                (ResponseEncoding::Structured, Reply::Structured(map)) => {
                    decode::faces_from_value(reply::field(&map, "faces")?)?
                }
                (encoding, other) => {
                    return Err(encoding_mismatch(Operation::GetFaces, encoding, &other));
                }
            };
            info!(faces = faces.len(), "face topology received");
            self.session.faces = Some(faces.clone());
            Ok(faces)
        }
        .instrument(span)
        .await
    }

    /// Close the connection. Further requests fail with [`MeshError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns the transport error if the close handshake fails; the client
    /// is closed either way. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        let span = self.span.clone();
        async move {
            let result = channel.close().await;
            match &result {
                Ok(()) => info!("connection closed"),
                Err(e) => warn!(error = %e, "close handshake failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    #[must_use]
    pub fn upload_completed(&self) -> bool {
        self.session.upload_completed
    }

    /// Vertices from the most recent successful [`MeshClient::forward`].
    #[must_use]
    pub fn last_vertices(&self) -> Option<&[Vertex]> {
        self.session.last_vertices.as_deref()
    }

    /// Topology from the most recent successful [`MeshClient::get_topology`].
    #[must_use]
    pub fn cached_faces(&self) -> Option<&[Face]> {
        self.session.faces.as_deref()
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    #[must_use]
    pub fn encoding(&self) -> ResponseEncoding {
        self.session.encoding
    }

    #[must_use]
    pub fn server_address(&self) -> &str {
        &self.session.address
    }

    /// Send one request and classify its correlated response.
    async fn exchange(&mut self, request: &Request<'_>) -> Result<Reply> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(MeshError::Closed);
        };
        let frame = request.to_frame(&self.session.id.to_string());

        match channel.request(&frame, self.session.request_timeout).await {
            Ok(response) => reply::classify(response),
            Err(e) if e.is_connection_loss() => {
                error!(error = %e, syscall = %frame.syscall, "connection lost");
                self.channel = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Log a server-reported failure and apply the action's failure policy.
    async fn fail(&mut self, op: Operation, msg: String) -> MeshError {
        error!(syscall = op.syscall(), msg = %msg, "server reported failure");
        if op.on_failure() == OnFailure::Disconnect {
            if let Err(e) = self.close().await {
                debug!(error = %e, "disconnect after failure was not clean");
            }
        }
        op.failure(msg)
    }
}

fn default_span(session_id: Uuid, config: &ClientConfig) -> Span {
    tracing::info_span!(
        "mesh_client",
        session = %session_id,
        started_at_ms = frames::now_ms(),
        encoding = config.encoding.as_str(),
    )
}

fn encoding_mismatch(op: Operation, encoding: ResponseEncoding, reply: &Reply) -> MeshError {
    MeshError::Protocol(format!(
        "`{}` got a {} response but the session negotiated {encoding}",
        op.syscall(),
        reply.kind()
    ))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
