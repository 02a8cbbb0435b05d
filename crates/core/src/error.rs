//! Error types for the Wi-Fi Display source.

use std::fmt;

use crate::playback::PipelineError;

/// Errors that can occur in the Wi-Fi Display source.
///
/// Variants map to how far a failure reaches:
///
/// - **Startup**: [`Bind`](Self::Bind), [`AlreadyRunning`](Self::AlreadyRunning).
/// - **Connection-fatal**: [`Parse`](Self::Parse), [`Protocol`](Self::Protocol),
///   [`Negotiation`](Self::Negotiation), [`Timeout`](Self::Timeout),
///   [`Pipeline`](Self::Pipeline). These end in a client disconnect.
/// - **Request-fatal**: [`SessionState`](Self::SessionState), answered in-band
///   with an RTSP error status while the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum WfdError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The interface could not be resolved or the listen call failed.
    #[error("cannot bind to {interface}: {reason}")]
    Bind { interface: String, reason: String },

    /// [`WifiDisplaySource::start`](crate::WifiDisplaySource::start) was called while already running.
    #[error("source already running")]
    AlreadyRunning,

    /// Failed to parse an RTSP message (RFC 2326 §6, §7).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Well-formed message that violates the exchange (e.g. a response without CSeq).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The sink rejected a handshake step or reported unusable capabilities.
    #[error("capability negotiation failed: {0}")]
    Negotiation(String),

    /// The request is not valid against the current session state.
    #[error(transparent)]
    SessionState(#[from] SessionStateError),

    /// The sink did not answer a keep-alive probe in time.
    #[error("keep-alive timed out")]
    Timeout,

    /// A playback session operation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// Message was not valid UTF-8.
    InvalidEncoding,
    /// A `text/parameters` line did not have the `name: value` form.
    InvalidParameter,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidEncoding => write!(f, "message is not UTF-8"),
            Self::InvalidParameter => write!(f, "invalid parameter line"),
        }
    }
}

/// A sink request that violates the session lifecycle.
///
/// Each variant carries the RTSP status it is answered with; the
/// connection and session state are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionStateError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("no playback session matches the request")]
    SessionNotFound,

    #[error("a playback session already exists")]
    SessionExists,

    #[error("{method} not valid in the current session state")]
    InvalidState { method: &'static str },

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
}

impl SessionStateError {
    /// RTSP status code and reason phrase (RFC 2326 §7.1.1).
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            Self::BadRequest(_) => (400, "Bad Request"),
            Self::SessionNotFound => (454, "Session Not Found"),
            Self::SessionExists | Self::InvalidState { .. } => {
                (455, "Method Not Valid in This State")
            }
            Self::UnsupportedTransport(_) => (461, "Unsupported Transport"),
            Self::MethodNotAllowed(_) => (405, "Method Not Allowed"),
        }
    }
}

/// Convenience alias for `Result<T, WfdError>`.
pub type Result<T> = std::result::Result<T, WfdError>;
