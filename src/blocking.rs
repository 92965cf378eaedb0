//! Blocking facade over [`crate::MeshClient`].
//!
//! Each call blocks the calling thread until the correlated response arrives
//! (or the configured request timeout elapses). Must not be used from inside
//! an async runtime.

use std::path::Path;

use tokio::runtime::{Builder, Runtime};
use tracing::Span;
use uuid::Uuid;

use crate::config::{ClientConfig, ResponseEncoding};
use crate::decode::{Face, Vertex};
use crate::error::Result;

pub struct MeshClient {
    inner: crate::MeshClient,
    runtime: Runtime,
}

impl MeshClient {
    /// Connect and complete the session handshake before returning.
    ///
    /// # Errors
    ///
    /// [`crate::MeshError::Io`] if the runtime cannot be built, otherwise see
    /// [`crate::MeshClient::connect`].
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_span(config, None)
    }

    /// # Errors
    ///
    /// See [`MeshClient::connect`].
    pub fn connect_with_span(config: ClientConfig, span: Option<Span>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let inner = runtime.block_on(crate::MeshClient::connect_with_span(config, span))?;
        Ok(Self { inner, runtime })
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::upload`].
    pub fn upload(&mut self, body_motion: &[u8]) -> Result<u64> {
        self.runtime.block_on(self.inner.upload(body_motion))
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::upload_named`].
    pub fn upload_named(&mut self, file_name: &str, body_motion: &[u8]) -> Result<u64> {
        self.runtime
            .block_on(self.inner.upload_named(file_name, body_motion))
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::upload_file`].
    pub fn upload_file(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        self.runtime.block_on(self.inner.upload_file(path))
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::forward`].
    pub fn forward(&mut self, frame_idx: i64) -> Result<Vec<Vertex>> {
        self.runtime.block_on(self.inner.forward(frame_idx))
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::get_topology`].
    pub fn get_topology(&mut self) -> Result<Vec<Face>> {
        self.runtime.block_on(self.inner.get_topology())
    }

    /// # Errors
    ///
    /// See [`crate::MeshClient::close`].
    pub fn close(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    #[must_use]
    pub fn upload_completed(&self) -> bool {
        self.inner.upload_completed()
    }

    #[must_use]
    pub fn last_vertices(&self) -> Option<&[Vertex]> {
        self.inner.last_vertices()
    }

    #[must_use]
    pub fn cached_faces(&self) -> Option<&[Face]> {
        self.inner.cached_faces()
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id()
    }

    #[must_use]
    pub fn encoding(&self) -> ResponseEncoding {
        self.inner.encoding()
    }
}
