//! Dead-client reaping and the M16 keep-alive.
//!
//! The reaper runs on a fixed interval and disconnects a client whose
//! transport is gone or whose last write failed. The keep-alive is armed
//! by PLAY: every RTSP message from the sink pushes the deadline out, and
//! a quiet sink is probed with a GET_PARAMETER. A probe still unanswered
//! at the next deadline ends the connection.

use tokio::time::Instant;

use super::{ResponseHandler, SessionController};
use crate::listener::DisconnectReason;
use crate::protocol::{RtspRequest, RtspResponse, WFD_CONTROL_URI};
use crate::session::LinkState;

#[derive(Debug, Clone, Copy)]
pub(super) struct KeepAlive {
    deadline: Instant,
    /// CSeq of the outstanding probe.
    probe: Option<u32>,
}

impl SessionController {
    /// Disconnect the client if its connection died.
    pub fn reap(&mut self) {
        let Some(client) = &self.client else {
            return;
        };
        let reason = match client.link {
            LinkState::Failed(kind) => DisconnectReason::Transport(kind),
            LinkState::Up if !self.transport.is_alive(client.conn) => {
                DisconnectReason::ConnectionLost
            }
            LinkState::Up => return,
        };
        tracing::warn!(conn = %client.conn, %reason, "reaping dead client");
        self.disconnect_client(reason);
    }

    /// When [`on_keepalive_timer`](Self::on_keepalive_timer) should next run.
    pub fn keepalive_deadline(&self) -> Option<Instant> {
        self.keepalive.map(|keepalive| keepalive.deadline)
    }

    pub fn on_keepalive_timer(&mut self, now: Instant) {
        let Some(keepalive) = self.keepalive else {
            return;
        };
        if now < keepalive.deadline {
            return;
        }

        if let Some(cseq) = keepalive.probe {
            tracing::warn!(cseq, "sink did not answer keep-alive");
            self.disconnect_client(DisconnectReason::Timeout);
            return;
        }

        let target = self.client.as_ref().and_then(|client| {
            let playback = client.playback.as_ref()?;
            Some((client.conn, playback.id))
        });
        let Some((conn, id)) = target else {
            self.cancel_keepalive();
            return;
        };

        tracing::debug!(%conn, session_id = %id, "sending keep-alive");
        let request =
            RtspRequest::new("GET_PARAMETER", WFD_CONTROL_URI).add_header("Session", &id.to_string());
        let cseq = self.send_request(conn, request, ResponseHandler::KeepAlive);
        self.keepalive = Some(KeepAlive {
            deadline: now + self.config.keepalive_timeout,
            probe: Some(cseq),
        });
    }

    pub(super) fn on_keepalive_response(&mut self, cseq: u32, response: &RtspResponse, now: Instant) {
        if !response.is_success() {
            tracing::debug!(cseq, status = response.status_code, "keep-alive answered with an error status");
        }
        let timeout = self.config.keepalive_timeout;
        if let Some(keepalive) = self.keepalive.as_mut()
            && keepalive.probe == Some(cseq)
        {
            keepalive.probe = None;
            keepalive.deadline = now + timeout;
        }
    }

    /// Any message from the sink counts as proof of life.
    pub(super) fn note_traffic(&mut self, now: Instant) {
        let timeout = self.config.keepalive_timeout;
        if let Some(keepalive) = self.keepalive.as_mut() {
            keepalive.deadline = now + timeout;
        }
    }

    pub(super) fn arm_keepalive(&mut self, now: Instant) {
        self.keepalive = Some(KeepAlive {
            deadline: now + self.config.keepalive_timeout,
            probe: None,
        });
    }

    pub(super) fn cancel_keepalive(&mut self) {
        self.keepalive = None;
    }
}
