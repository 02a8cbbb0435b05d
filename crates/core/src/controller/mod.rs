//! The session controller: single owner of the client and playback state.
//!
//! Every input (accepted connections, received messages, closures,
//! playback failures, timer firings) reaches the controller as a method
//! call on one task, so nothing here needs a lock. The controller in turn
//! drives the handshake, serves the sink's requests, and keeps the
//! liveness timers, all through the same [`disconnect_client`] exit for
//! connection-fatal failures.
//!
//! [`disconnect_client`]: SessionController::disconnect_client

mod correlator;
mod dispatch;
mod handshake;
mod liveness;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::WfdError;
use crate::listener::{DisconnectReason, DisplayClientListener};
use crate::playback::{PipelineError, PlaybackFactory};
use crate::protocol::{RtspMessage, RtspRequest};
use crate::session::{ClientRecord, LinkState, PlaybackSessionId};
use crate::source::SourceConfig;
use crate::transport::{ConnectionId, NetworkSession};

pub use correlator::{ResponseCorrelator, ResponseHandler, ResponseId};

/// Inputs funneled into the controller's inbox.
#[derive(Debug)]
pub enum Event {
    ConnectionAccepted {
        conn: ConnectionId,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    },
    /// One complete, framed RTSP message.
    DataReceived { conn: ConnectionId, data: Vec<u8> },
    /// `error` is `None` for a clean close by the peer.
    ConnectionClosed {
        conn: ConnectionId,
        error: Option<io::Error>,
    },
    PlaybackFailed {
        id: PlaybackSessionId,
        error: PipelineError,
    },
}

pub struct SessionController {
    config: Arc<SourceConfig>,
    transport: Box<dyn NetworkSession>,
    playback: Arc<dyn PlaybackFactory>,
    listener: Arc<dyn DisplayClientListener>,
    /// Handed to playback sessions so they can report failures.
    events: mpsc::UnboundedSender<Event>,
    client: Option<ClientRecord>,
    responses: ResponseCorrelator,
    next_cseq: u32,
    keepalive: Option<liveness::KeepAlive>,
}

impl SessionController {
    pub fn new(
        config: Arc<SourceConfig>,
        transport: Box<dyn NetworkSession>,
        playback: Arc<dyn PlaybackFactory>,
        listener: Arc<dyn DisplayClientListener>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            config,
            transport,
            playback,
            listener,
            events,
            client: None,
            responses: ResponseCorrelator::new(),
            next_cseq: 1,
            keepalive: None,
        }
    }

    pub fn handle_event(&mut self, event: Event, now: Instant) {
        match event {
            Event::ConnectionAccepted {
                conn,
                remote_addr,
                local_addr,
            } => self.on_connection_accepted(conn, remote_addr, local_addr),
            Event::DataReceived { conn, data } => self.on_data(conn, &data, now),
            Event::ConnectionClosed { conn, error } => self.on_connection_closed(conn, error),
            Event::PlaybackFailed { id, error } => self.on_playback_failed(id, error),
        }
    }

    /// The connected sink, if any.
    pub fn client(&self) -> Option<&ClientRecord> {
        self.client.as_ref()
    }

    pub fn playback_session_id(&self) -> Option<PlaybackSessionId> {
        self.client.as_ref()?.playback.as_ref().map(|p| p.id)
    }

    /// Number of source-initiated requests still awaiting a response.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Disconnect the current client and shut down its playback session.
    ///
    /// Idempotent: only the first call for a connection tears down, closes
    /// and notifies the listener.
    pub fn disconnect_client(&mut self, reason: DisconnectReason) {
        let Some(mut client) = self.client.take() else {
            return;
        };

        self.cancel_keepalive();
        if let Some(playback) = client.playback.take() {
            let id = playback.id;
            if let Err(e) = playback.teardown() {
                tracing::warn!(session_id = %id, error = %e, "playback teardown failed during disconnect");
            }
        }
        self.transport.close(client.conn);
        let dropped = self.responses.forget_connection(client.conn);

        tracing::info!(
            conn = %client.conn,
            remote = %client.remote_addr,
            %reason,
            code = reason.code(),
            dropped_requests = dropped,
            "client disconnected"
        );
        self.listener.on_display_disconnected(&reason);
    }

    /// Orderly shutdown when the source stops.
    pub fn shutdown(&mut self) {
        self.disconnect_client(DisconnectReason::Normal);
    }

    fn on_connection_accepted(
        &mut self,
        conn: ConnectionId,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    ) {
        if let Some(client) = &self.client {
            tracing::warn!(
                %conn,
                %remote_addr,
                existing = %client.conn,
                "rejecting connection, a sink is already connected"
            );
            self.transport.close(conn);
            return;
        }

        tracing::info!(%conn, %remote_addr, %local_addr, "sink connected, starting negotiation");
        self.client = Some(ClientRecord::new(conn, remote_addr, local_addr));
        self.send_capability_discovery(conn);
    }

    fn on_data(&mut self, conn: ConnectionId, data: &[u8], now: Instant) {
        if !self.is_current(conn) {
            tracing::debug!(%conn, "dropping data from a connection that is no longer current");
            return;
        }

        let message = match RtspMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%conn, error = %e, "unparseable message");
                self.disconnect_client(DisconnectReason::Protocol);
                return;
            }
        };

        self.note_traffic(now);
        match message {
            RtspMessage::Request(request) => self.on_request(conn, request, now),
            RtspMessage::Response(response) => self.on_response(conn, response, now),
        }
    }

    fn on_connection_closed(&mut self, conn: ConnectionId, error: Option<io::Error>) {
        if !self.is_current(conn) {
            return;
        }
        let reason = match &error {
            Some(e) => {
                tracing::warn!(%conn, error = %e, "connection error");
                DisconnectReason::from(e)
            }
            None => DisconnectReason::PeerClosed,
        };
        self.disconnect_client(reason);
    }

    fn on_playback_failed(&mut self, id: PlaybackSessionId, error: PipelineError) {
        if self.playback_session_id() != Some(id) {
            tracing::debug!(session_id = %id, error = %error, "ignoring failure of a retired playback session");
            return;
        }
        tracing::error!(session_id = %id, error = %error, "playback session failed");
        self.disconnect_client(DisconnectReason::Pipeline);
    }

    fn is_current(&self, conn: ConnectionId) -> bool {
        self.client.as_ref().is_some_and(|client| client.conn == conn)
    }

    /// Register `request` with the correlator under a fresh CSeq and send it.
    fn send_request(
        &mut self,
        conn: ConnectionId,
        request: RtspRequest,
        handler: ResponseHandler,
    ) -> u32 {
        let cseq = self.next_cseq;
        self.next_cseq = self.next_cseq.wrapping_add(1).max(1);

        self.responses.register(conn, cseq, handler);
        let request = request.with_cseq(cseq);
        tracing::debug!(%conn, cseq, method = %request.method, ?handler, "sending request");
        self.send(conn, request.serialize());
        cseq
    }

    /// Write to the connection. A failed write marks the link so the reaper
    /// picks the client up.
    fn send(&mut self, conn: ConnectionId, message: String) {
        if let Err(e) = self.transport.send(conn, message.as_bytes()) {
            tracing::warn!(%conn, error = %e, "send failed");
            if let Some(client) = self.client.as_mut().filter(|c| c.conn == conn) {
                client.link = LinkState::Failed(e.kind());
            }
        }
    }
}

/// Disconnect reason for a connection-fatal error.
fn reason_for(err: &WfdError) -> DisconnectReason {
    match err {
        WfdError::Io(e) => DisconnectReason::from(e),
        WfdError::Negotiation(_) => DisconnectReason::Negotiation,
        WfdError::Timeout => DisconnectReason::Timeout,
        WfdError::Pipeline(_) => DisconnectReason::Pipeline,
        _ => DisconnectReason::Protocol,
    }
}

fn no_client() -> WfdError {
    WfdError::Protocol("no client connected".to_string())
}
