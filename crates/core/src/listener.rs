//! Notifications to the application hosting the source.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::session::PlaybackSessionId;

// errno values, negated, as reported to the host application.
const EIO: i32 = 5;
const EPIPE: i32 = 32;
const EINVAL: i32 = 22;
const EPROTO: i32 = 71;
const ECONNRESET: i32 = 104;
const ETIMEDOUT: i32 = 110;

/// Why a client connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Orderly shutdown initiated by the source (`stop`).
    Normal,
    /// The sink closed the connection cleanly.
    PeerClosed,
    /// The transport reported an error.
    Transport(io::ErrorKind),
    /// The reaper found the connection dead without a close event.
    ConnectionLost,
    /// Malformed message or broken request/response exchange.
    Protocol,
    /// A handshake step failed.
    Negotiation,
    /// The sink stopped answering keep-alive probes.
    Timeout,
    /// The playback pipeline failed.
    Pipeline,
}

impl DisconnectReason {
    /// Status code for the host: 0 for a clean ending, a negative
    /// errno-style value otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Self::Normal | Self::PeerClosed => 0,
            Self::Transport(io::ErrorKind::BrokenPipe) => -EPIPE,
            Self::Transport(io::ErrorKind::ConnectionReset) | Self::ConnectionLost => -ECONNRESET,
            Self::Transport(io::ErrorKind::TimedOut) | Self::Timeout => -ETIMEDOUT,
            Self::Transport(_) | Self::Pipeline => -EIO,
            Self::Protocol => -EPROTO,
            Self::Negotiation => -EINVAL,
        }
    }

    pub fn is_error(&self) -> bool {
        self.code() != 0
    }
}

impl From<&io::Error> for DisconnectReason {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => Self::Protocol,
            io::ErrorKind::UnexpectedEof => Self::PeerClosed,
            kind => Self::Transport(kind),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "source stopped"),
            Self::PeerClosed => write!(f, "closed by sink"),
            Self::Transport(kind) => write!(f, "transport error: {kind}"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Protocol => write!(f, "protocol error"),
            Self::Negotiation => write!(f, "capability negotiation failed"),
            Self::Timeout => write!(f, "keep-alive timeout"),
            Self::Pipeline => write!(f, "playback pipeline failure"),
        }
    }
}

/// A sink that completed SETUP.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub session_id: PlaybackSessionId,
}

/// Receives connection and session status from the source.
///
/// For each client connection, `on_display_connected` fires at most once
/// (on its first successful SETUP) and `on_display_disconnected` exactly
/// once.
pub trait DisplayClientListener: Send + Sync {
    fn on_display_connected(&self, info: &DisplayInfo);

    fn on_display_disconnected(&self, reason: &DisconnectReason);
}

/// Listener that logs notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl DisplayClientListener for TracingListener {
    fn on_display_connected(&self, info: &DisplayInfo) {
        tracing::info!(
            remote = %info.remote_addr,
            session_id = %info.session_id,
            "display connected"
        );
    }

    fn on_display_disconnected(&self, reason: &DisconnectReason) {
        if reason.is_error() {
            tracing::warn!(%reason, code = reason.code(), "display disconnected");
        } else {
            tracing::info!(%reason, "display disconnected");
        }
    }
}
