//! Client configuration parsed from environment variables or built in code.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::MeshError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 29091;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Matches the service's 128 MiB buffer limit.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 128 * 1024 * 1024;

/// Wire shape the server uses for `forward` and `get_faces` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseEncoding {
    /// Packed little-endian arrays in the frame blob.
    #[default]
    Bytes,
    /// A `status`-tagged map in the frame data.
    Structured,
}

impl ResponseEncoding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Structured => "structured",
        }
    }
}

impl fmt::Display for ResponseEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseEncoding {
    type Err = MeshError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bytes" => Ok(Self::Bytes),
            "structured" => Ok(Self::Structured),
            other => Err(MeshError::Config(format!(
                "unknown response encoding '{other}' (expected 'bytes' or 'structured')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub encoding: ResponseEncoding,
    /// Bound on the WebSocket upgrade plus the `session:connected` handshake.
    pub connect_timeout: Duration,
    /// `None` waits for each response indefinitely.
    pub request_timeout: Option<Duration>,
    pub max_message_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            encoding: ResponseEncoding::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `MESH_HOST`: default `127.0.0.1`
    /// - `MESH_PORT`: default 29091
    /// - `MESH_RESPONSE_ENCODING`: `bytes` (default) or `structured`
    /// - `MESH_CONNECT_TIMEOUT_SECS`: default 10, must be positive
    /// - `MESH_REQUEST_TIMEOUT_SECS`: unset or 0 waits indefinitely
    /// - `MESH_MAX_MESSAGE_BYTES`: default 128 MiB
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Config`] for values that do not parse or are
    /// out of range.
    pub fn from_env() -> Result<Self, MeshError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied variable source.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Config`] for values that do not parse or are
    /// out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MeshError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let host = get("MESH_HOST").unwrap_or(defaults.host);
        let port = parse_or("MESH_PORT", get("MESH_PORT"), defaults.port)?;
        let encoding = match get("MESH_RESPONSE_ENCODING") {
            Some(raw) => raw.parse()?,
            None => defaults.encoding,
        };
        let connect_secs = parse_or(
            "MESH_CONNECT_TIMEOUT_SECS",
            get("MESH_CONNECT_TIMEOUT_SECS"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        if connect_secs == 0 {
            return Err(MeshError::Config(
                "MESH_CONNECT_TIMEOUT_SECS must be at least 1".to_owned(),
            ));
        }
        let request_secs = parse_or::<u64>(
            "MESH_REQUEST_TIMEOUT_SECS",
            get("MESH_REQUEST_TIMEOUT_SECS"),
            0,
        )?;
        let max_message_bytes = parse_or(
            "MESH_MAX_MESSAGE_BYTES",
            get("MESH_MAX_MESSAGE_BYTES"),
            defaults.max_message_bytes,
        )?;

        Ok(Self {
            host,
            port,
            encoding,
            connect_timeout: Duration::from_secs(connect_secs),
            request_timeout: (request_secs > 0).then(|| Duration::from_secs(request_secs)),
            max_message_bytes,
        })
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: ResponseEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// `host:port` as used in logs.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL carrying the negotiated response encoding.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!(
            "ws://{}/ws?encoding={}",
            self.address(),
            self.encoding.as_str()
        )
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, MeshError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.trim()
        .parse::<T>()
        .map_err(|_| MeshError::Config(format!("{key} is not a valid number: {raw}")))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
