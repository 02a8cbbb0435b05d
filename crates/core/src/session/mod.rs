//! Client and playback session state.
//!
//! The source serves a single sink at a time. Its [`ClientRecord`] lives
//! from connection accept to disconnect and owns, once the sink has sent
//! SETUP, the [`ActivePlayback`]:
//!
//! ```text
//! SETUP          -> Ready
//! PLAY           -> Playing
//! PAUSE          -> Paused   (from Playing)
//! PLAY           -> Playing  (from Ready or Paused)
//! TEARDOWN       -> (removed, connection stays open)
//! disconnect     -> (removed together with the client record)
//! ```

pub mod transport;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::playback::{PipelineError, PlaybackSession};
use crate::protocol::{ClientRtpPorts, Parameters};
use crate::transport::ConnectionId;
pub use transport::TransportHeader;

static PLAYBACK_SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a playback session, carried in the RTSP `Session` header.
///
/// Minted from a process-wide 64-bit counter starting at 1, so an identity
/// is never handed out twice in the same process and is never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackSessionId(u64);

impl PlaybackSessionId {
    pub fn mint() -> Self {
        PlaybackSessionId(PLAYBACK_SESSION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Parse the identifier part of a `Session` header value.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse().ok().map(PlaybackSessionId)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created via SETUP, not yet playing.
    Ready,
    /// Media is being delivered.
    Playing,
    /// Delivery suspended; can resume via PLAY.
    Paused,
}

/// Progress of the source-initiated capability negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// M1 sent, waiting for the sink's OPTIONS reply.
    CapabilityDiscovery,
    /// M3 sent, waiting for the sink's parameters.
    ParameterQuery,
    /// M4 sent, waiting for the sink to accept the selection.
    ParameterSet,
    /// M5 sent, waiting for the sink to acknowledge the SETUP trigger.
    SetupTrigger,
    /// Negotiation done; the sink is expected to send SETUP.
    Complete,
}

/// Health of the control connection as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    /// A write failed; the reaper will disconnect the client.
    Failed(io::ErrorKind),
}

/// The playback session created by SETUP.
pub struct ActivePlayback {
    pub id: PlaybackSessionId,
    pub state: SessionState,
    pub transport: TransportHeader,
    handle: Box<dyn PlaybackSession>,
}

impl ActivePlayback {
    pub fn new(
        id: PlaybackSessionId,
        transport: TransportHeader,
        handle: Box<dyn PlaybackSession>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Ready,
            transport,
            handle,
        }
    }

    pub fn local_rtp_port(&self) -> u16 {
        self.handle.local_rtp_port()
    }

    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.handle.start()?;
        self.set_state(SessionState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PipelineError> {
        self.handle.pause()?;
        self.set_state(SessionState::Paused);
        Ok(())
    }

    /// Release the pipeline; the identity is retired with `self`.
    pub fn teardown(mut self) -> Result<(), PipelineError> {
        tracing::debug!(session_id = %self.id, "tearing down playback session");
        self.handle.teardown()
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    /// Format the `Session` response header value per RFC 2326 §12.37.
    ///
    /// Example: `"12;timeout=30"`
    pub fn session_header_value(&self, timeout_secs: u64) -> String {
        format!("{};timeout={}", self.id, timeout_secs)
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(session_id = %self.id, old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }
}

impl fmt::Debug for ActivePlayback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivePlayback")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// The one connected sink.
#[derive(Debug)]
pub struct ClientRecord {
    pub conn: ConnectionId,
    pub remote_addr: SocketAddr,
    /// Local address the sink connected to.
    pub local_addr: SocketAddr,
    pub handshake: HandshakeStage,
    pub link: LinkState,
    /// Parameters reported by the sink (M3 reply, later SET_PARAMETERs).
    pub sink_params: Parameters,
    /// RTP ports from the sink's `wfd_client_rtp_ports`.
    pub rtp_ports: Option<ClientRtpPorts>,
    /// Whether the listener has been told about an established session.
    pub announced: bool,
    pub playback: Option<ActivePlayback>,
}

impl ClientRecord {
    pub fn new(conn: ConnectionId, remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            conn,
            remote_addr,
            local_addr,
            handshake: HandshakeStage::CapabilityDiscovery,
            link: LinkState::Up,
            sink_params: Parameters::new(),
            rtp_ports: None,
            announced: false,
            playback: None,
        }
    }

    /// The active playback, if the request's `Session` header names it.
    pub fn matching_playback(&mut self, session: Option<&str>) -> Option<&mut ActivePlayback> {
        let id = PlaybackSessionId::parse(session?)?;
        self.playback.as_mut().filter(|playback| playback.id == id)
    }
}
