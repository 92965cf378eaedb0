//! Service actions, their request frames, and what a failure does to the session.

use frames::Frame;

use crate::error::MeshError;

/// Largest frame index magnitude that survives the wire's double encoding.
pub const MAX_FRAME_INDEX: i64 = 1 << 53;

/// What the client does with its connection when the server reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Disconnect,
    KeepOpen,
}

/// Actions the mesh service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Forward,
    GetFaces,
}

impl Operation {
    /// Wire action name.
    #[must_use]
    pub fn syscall(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Forward => "forward",
            Self::GetFaces => "get_faces",
        }
    }

    /// Failure policy table: upload and get_faces failures disconnect,
    /// forward failures keep the connection.
    #[must_use]
    pub fn on_failure(self) -> OnFailure {
        match self {
            Self::Upload | Self::GetFaces => OnFailure::Disconnect,
            Self::Forward => OnFailure::KeepOpen,
        }
    }

    /// Typed error for a server-reported failure of this action.
    #[must_use]
    pub fn failure(self, msg: String) -> MeshError {
        match self {
            Self::Upload => MeshError::UploadRejected { msg },
            Self::Forward => MeshError::ForwardFailed { msg },
            Self::GetFaces => MeshError::GetTopologyFailed { msg },
        }
    }
}

/// One request to the service. Built per call, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    Upload { file_name: &'a str, file_data: &'a [u8] },
    Forward { frame_idx: i64 },
    GetTopology,
}

impl Request<'_> {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Upload { .. } => Operation::Upload,
            Self::Forward { .. } => Operation::Forward,
            Self::GetTopology => Operation::GetFaces,
        }
    }

    /// Build the request frame. Every request carries the session id as
    /// `uuid` so the server can key its per-client state.
    #[must_use]
    pub fn to_frame(&self, session_id: &str) -> Frame {
        let frame = Frame::request(self.operation().syscall())
            .with_from(session_id)
            .with_data("uuid", session_id);
        match self {
            Self::Upload {
                file_name,
                file_data,
            } => frame
                .with_data("file_name", *file_name)
                .with_blob(file_data.to_vec()),
            Self::Forward { frame_idx } => frame.with_data("frame_idx", *frame_idx),
            Self::GetTopology => frame,
        }
    }
}
