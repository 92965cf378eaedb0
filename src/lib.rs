//! Client for a remote body-mesh evaluation service.
//!
//! A [`MeshClient`] owns one WebSocket session with the service. It uploads a
//! motion sequence, asks the server to evaluate single frames into SMPL mesh
//! vertices (6890 per frame), and fetches the mesh's face topology.
//!
//! Responses arrive either as packed binary buffers or as `status`-tagged
//! maps, depending on the [`ResponseEncoding`] negotiated at connect time.
//! Both decode to the same plain [`Vertex`] / [`Face`] triples.
//!
//! ```no_run
//! # async fn demo() -> Result<(), mesh_client::MeshError> {
//! use mesh_client::{ClientConfig, MeshClient, ResponseEncoding};
//!
//! let config = ClientConfig::new("127.0.0.1", 29091).with_encoding(ResponseEncoding::Bytes);
//! let mut client = MeshClient::connect(config).await?;
//! let n_frames = client.upload_file("walk.npz").await?;
//! let faces = client.get_topology().await?;
//! for idx in 0..n_frames {
//!     let verts = client.forward(i64::try_from(idx).unwrap_or(i64::MAX)).await?;
//!     assert_eq!(verts.len(), mesh_client::SMPL_VERTEX_COUNT);
//! }
//! println!("{} faces", faces.len());
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod channel;
mod client;
pub mod config;
pub mod decode;
mod error;
pub mod ops;
pub mod reply;

pub use channel::{Channel, WsChannel};
pub use client::{DEFAULT_FILE_NAME, MeshClient};
pub use config::{ClientConfig, ResponseEncoding};
pub use decode::{Face, SMPL_VERTEX_COUNT, Vertex};
pub use error::{MeshError, Result};
