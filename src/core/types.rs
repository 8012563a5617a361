use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience result alias for client operations.
pub type RenosResult<T> = Result<T, RenosError>;

/// Why a connection attempt failed before the socket opened.
///
/// Only [`ConnectFailureKind::Refused`] and [`ConnectFailureKind::Timeout`] are treated as
/// transient: they schedule a reconnect. Anything else (bad handshake status, DNS failure,
/// TLS errors) is logged and left for the caller to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailureKind {
    Refused,
    Timeout,
    Other,
}

impl ConnectFailureKind {
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, ConnectFailureKind::Refused | ConnectFailureKind::Timeout)
    }
}

impl fmt::Display for ConnectFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectFailureKind::Refused => "refused",
            ConnectFailureKind::Timeout => "timeout",
            ConnectFailureKind::Other => "other",
        })
    }
}

/// Canonical error surface of the client.
#[derive(Debug, Error)]
pub enum RenosError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed ({kind}): {message}")]
    Connect {
        kind: ConnectFailureKind,
        message: String,
    },

    #[error("Transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not connected: {0} was not sent")]
    SendWhileDisconnected(&'static str),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Client has been finished")]
    Finished,
}

impl RenosError {
    /// Classification used by the supervisor to decide whether a failed attempt is retried.
    pub fn connect_failure_kind(&self) -> ConnectFailureKind {
        match self {
            RenosError::Connect { kind, .. } => *kind,
            _ => ConnectFailureKind::Other,
        }
    }
}

/// Lifecycle state of the events connection, owned by the connection supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
}

impl ConnectionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectScheduled => "reconnect_scheduled",
        })
    }
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        Self {
            // Device payloads are small JSON documents; large observation bursts stay well
            // under a megabyte.
            write_buffer_bytes: 64 << 10,
            max_write_buffer_bytes: 256 << 10,
            max_message_bytes: 4 * 1024 * 1024,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Point-in-time view of the supervisor, mostly for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub reconnect_pending: bool,
    /// Reconnects scheduled since the last successful connect.
    pub reconnect_attempts: u64,
    pub connect_attempts: u64,
    pub frames_sent: u64,
    pub token_set: bool,
}
