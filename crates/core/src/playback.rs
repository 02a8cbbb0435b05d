//! Seam to the media pipeline that captures, encodes and sends the stream.
//!
//! The source only drives the pipeline's lifecycle. A [`PlaybackFactory`]
//! creates one [`PlaybackSession`] per successful SETUP; the controller
//! then calls `start`, `pause` and `teardown` on it, one call at a time.
//! Failures the pipeline detects on its own (encoder died, socket error)
//! are reported through the [`PlaybackNotifier`] it was created with.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use tokio::sync::mpsc;

use crate::controller::Event;
use crate::protocol::ClientRtpPorts;
use crate::session::PlaybackSessionId;
use crate::session::transport::TransportHeader;

/// Lifecycle operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOp {
    Create,
    Start,
    Pause,
    Teardown,
    Stream,
}

impl fmt::Display for PlaybackOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Pause => write!(f, "pause"),
            Self::Teardown => write!(f, "teardown"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// A pipeline-specific failure, surfaced to the RTSP layer as a generic
/// session failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("playback {op} failed: {message}")]
pub struct PipelineError {
    pub op: PlaybackOp,
    pub message: String,
}

impl PipelineError {
    pub fn new(op: PlaybackOp, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Everything the pipeline needs to know to set up a stream.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub id: PlaybackSessionId,
    /// Sink address the stream is sent to.
    pub remote_addr: IpAddr,
    /// Local address the sink connected to; the stream leaves from this interface.
    pub local_addr: SocketAddr,
    /// Transport the sink asked for in SETUP.
    pub transport: TransportHeader,
    /// Ports the sink reported during capability negotiation, if any.
    pub client_rtp_ports: Option<ClientRtpPorts>,
}

/// A running (or ready) media pipeline.
pub trait PlaybackSession: Send {
    /// Local RTP port the stream is sent from, advertised as `server_port`.
    fn local_rtp_port(&self) -> u16;

    fn start(&mut self) -> Result<(), PipelineError>;

    fn pause(&mut self) -> Result<(), PipelineError>;

    /// Release all pipeline resources. Called exactly once.
    fn teardown(&mut self) -> Result<(), PipelineError>;
}

/// Creates playback sessions on SETUP.
pub trait PlaybackFactory: Send + Sync {
    fn create(
        &self,
        request: &PlaybackRequest,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackSession>, PipelineError>;
}

/// Handle a playback session uses to report asynchronous failures.
///
/// Reports for a session that has since been torn down are dropped by the
/// controller.
#[derive(Debug, Clone)]
pub struct PlaybackNotifier {
    id: PlaybackSessionId,
    events: mpsc::UnboundedSender<Event>,
}

impl PlaybackNotifier {
    pub(crate) fn new(id: PlaybackSessionId, events: mpsc::UnboundedSender<Event>) -> Self {
        Self { id, events }
    }

    pub fn id(&self) -> PlaybackSessionId {
        self.id
    }

    pub fn session_failed(&self, error: PipelineError) {
        if self
            .events
            .send(Event::PlaybackFailed { id: self.id, error })
            .is_err()
        {
            tracing::debug!(session_id = %self.id, "source gone, dropping playback failure");
        }
    }
}

/// Stand-in pipeline that only logs lifecycle calls.
///
/// Lets the source run end to end without a media stack, e.g. to exercise
/// a sink's RTSP implementation.
#[derive(Debug, Clone)]
pub struct LoggingPlayback {
    rtp_port: u16,
}

impl LoggingPlayback {
    pub fn new(rtp_port: u16) -> Self {
        Self { rtp_port }
    }
}

impl PlaybackFactory for LoggingPlayback {
    fn create(
        &self,
        request: &PlaybackRequest,
        _notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackSession>, PipelineError> {
        tracing::info!(
            session_id = %request.id,
            remote = %request.remote_addr,
            transport = ?request.transport,
            "playback session created"
        );
        Ok(Box::new(LoggingSession {
            id: request.id,
            rtp_port: self.rtp_port,
        }))
    }
}

struct LoggingSession {
    id: PlaybackSessionId,
    rtp_port: u16,
}

impl PlaybackSession for LoggingSession {
    fn local_rtp_port(&self) -> u16 {
        self.rtp_port
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        tracing::info!(session_id = %self.id, "playback started");
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PipelineError> {
        tracing::info!(session_id = %self.id, "playback paused");
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), PipelineError> {
        tracing::info!(session_id = %self.id, "playback torn down");
        Ok(())
    }
}
