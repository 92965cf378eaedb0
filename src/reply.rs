//! Classification of correlated response frames.
//!
//! Every terminal frame is turned into a [`Reply`] before the client looks at
//! it, so operation code matches on a tag instead of probing payload shapes.

use frames::{Frame, Status};
use serde_json::{Map, Value};

use crate::error::{MeshError, Result};

/// `status` value that marks a structured success.
pub const STATUS_SUCCESS: &str = "success";

const UNKNOWN_FAILURE: &str = "request failed";

/// Outcome of one request as classified by the transport adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Raw buffer; being binary is itself the success signal.
    Binary(Vec<u8>),
    /// A `status: success` map.
    Structured(Map<String, Value>),
    /// Server-reported failure with its message.
    Failed(String),
}

impl Reply {
    /// Short shape name for log and error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Structured(_) => "structured",
            Self::Failed(_) => "failed",
        }
    }
}

/// Classify a terminal response frame.
///
/// # Errors
///
/// [`MeshError::Protocol`] when a `done` frame has neither a blob nor a map
/// with a string `status`.
pub fn classify(frame: Frame) -> Result<Reply> {
    match frame.status {
        Status::Error => Ok(Reply::Failed(message(&frame.data))),
        Status::Cancel => Ok(Reply::Failed("request cancelled by server".to_owned())),
        Status::Request => Err(MeshError::Protocol(format!(
            "expected a response to `{}`, got a request frame",
            frame.syscall
        ))),
        Status::Done => {
            if let Some(blob) = frame.blob {
                return Ok(Reply::Binary(blob));
            }
            let Value::Object(map) = frame.data else {
                return Err(MeshError::Protocol(format!(
                    "`{}` response payload is not a map",
                    frame.syscall
                )));
            };
            match map.get("status").and_then(Value::as_str) {
                Some(STATUS_SUCCESS) => Ok(Reply::Structured(map)),
                Some(_) => Ok(Reply::Failed(message(&Value::Object(map)))),
                None => Err(MeshError::Protocol(format!(
                    "`{}` response is missing `status`",
                    frame.syscall
                ))),
            }
        }
    }
}

/// Fetch a required field from a structured success map.
///
/// # Errors
///
/// [`MeshError::Protocol`] when the field is absent.
pub fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| MeshError::Protocol(format!("response is missing `{key}`")))
}

fn message(data: &Value) -> String {
    data.get("msg")
        .or_else(|| data.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_FAILURE)
        .to_owned()
}

#[cfg(test)]
#[path = "reply_test.rs"]
mod tests;
