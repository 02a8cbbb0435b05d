//! Serving requests the sink sends (M2, M6 to M9, parameter requests).
//!
//! Lifecycle violations are answered in-band with the status carried by
//! [`SessionStateError`] and leave all state untouched. Pipeline failures
//! are answered with 500 and then end the connection.

use tokio::time::Instant;

use super::handshake::selected_parameters;
use super::{SessionController, no_client, reason_for};
use crate::error::{Result, SessionStateError, WfdError};
use crate::listener::DisplayInfo;
use crate::playback::{PlaybackNotifier, PlaybackRequest};
use crate::protocol::{Parameters, RtspRequest, RtspResponse, TEXT_PARAMETERS, sdp};
use crate::session::{ActivePlayback, ClientRecord, PlaybackSessionId, TransportHeader};
use crate::transport::ConnectionId;

/// `Public` header of the M2 reply.
const PUBLIC_METHODS: &str =
    "org.wfa.wfd1.0, OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE, GET_PARAMETER, SET_PARAMETER";

/// `Allow` header of a 405 reply.
const ALLOWED_METHODS: &str =
    "OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE, GET_PARAMETER, SET_PARAMETER";

fn reply(cseq: u32) -> RtspResponse {
    RtspResponse::ok().add_header("CSeq", &cseq.to_string())
}

/// `Session` header to echo for a request.
///
/// A request without `Session` gets none back; one that names a session
/// must name the active one.
fn checked_session(
    client: &mut ClientRecord,
    request: &RtspRequest,
    timeout_secs: u64,
) -> std::result::Result<Option<String>, SessionStateError> {
    let Some(value) = request.session_id() else {
        return Ok(None);
    };
    client
        .matching_playback(Some(value))
        .map(|playback| Some(playback.session_header_value(timeout_secs)))
        .ok_or(SessionStateError::SessionNotFound)
}

impl SessionController {
    pub(super) fn on_request(&mut self, conn: ConnectionId, request: RtspRequest, now: Instant) {
        let Some(cseq) = request.cseq() else {
            tracing::warn!(%conn, method = %request.method, "request without CSeq");
            self.send(conn, RtspResponse::bad_request().serialize());
            return;
        };
        tracing::debug!(%conn, cseq, method = %request.method, uri = %request.uri, "request");

        let result = match request.method.as_str() {
            "OPTIONS" => Ok(reply(cseq).add_header("Public", PUBLIC_METHODS)),
            "DESCRIBE" => self.handle_describe(cseq),
            "SETUP" => self.handle_setup(cseq, &request),
            "PLAY" => self.handle_play(cseq, &request, now),
            "PAUSE" => self.handle_pause(cseq, &request),
            "TEARDOWN" => self.handle_teardown(cseq, &request),
            "GET_PARAMETER" => self.handle_get_parameter(cseq, &request),
            "SET_PARAMETER" => self.handle_set_parameter(cseq, &request),
            other => Err(SessionStateError::MethodNotAllowed(other.to_string()).into()),
        };

        match result {
            Ok(response) => {
                tracing::debug!(%conn, cseq, status = response.status_code, "response");
                self.send(conn, response.serialize());
            }
            Err(WfdError::SessionState(e)) => {
                let (code, text) = e.status();
                tracing::warn!(%conn, cseq, method = %request.method, status = code, error = %e, "request rejected");
                let mut response = RtspResponse::new(code, text).add_header("CSeq", &cseq.to_string());
                if matches!(e, SessionStateError::MethodNotAllowed(_)) {
                    response = response.add_header("Allow", ALLOWED_METHODS);
                }
                self.send(conn, response.serialize());
            }
            Err(e) => {
                tracing::error!(%conn, cseq, method = %request.method, error = %e, "request failed");
                let response = RtspResponse::internal_error().add_header("CSeq", &cseq.to_string());
                self.send(conn, response.serialize());
                self.disconnect_client(reason_for(&e));
            }
        }
    }

    fn handle_describe(&mut self, cseq: u32) -> Result<RtspResponse> {
        let client = self.client.as_ref().ok_or_else(no_client)?;
        let ip = client.local_addr.ip().to_string();
        Ok(reply(cseq)
            .add_header("Content-Base", &format!("rtsp://{ip}/wfd1.0/"))
            .with_body("application/sdp", sdp::generate_sdp(&self.config, &ip)))
    }

    /// M6: create the one playback session of this client.
    fn handle_setup(&mut self, cseq: u32, request: &RtspRequest) -> Result<RtspResponse> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        if let Some(existing) = &client.playback {
            tracing::warn!(session_id = %existing.id, "SETUP while a playback session exists");
            return Err(SessionStateError::SessionExists.into());
        }

        let header = request
            .get_header("Transport")
            .ok_or(SessionStateError::BadRequest("missing Transport header"))?;
        let transport = TransportHeader::parse(header)?;

        let id = PlaybackSessionId::mint();
        let playback_request = PlaybackRequest {
            id,
            remote_addr: client.remote_addr.ip(),
            local_addr: client.local_addr,
            transport: transport.clone(),
            client_rtp_ports: client.rtp_ports,
        };
        let notifier = PlaybackNotifier::new(id, self.events.clone());
        let handle = self.playback.create(&playback_request, notifier)?;
        let playback = ActivePlayback::new(id, transport, handle);

        let response = reply(cseq)
            .add_header(
                "Session",
                &playback.session_header_value(self.config.session_timeout_secs),
            )
            .add_header("Transport", &playback.transport.reply(playback.local_rtp_port()));
        tracing::info!(
            conn = %client.conn,
            session_id = %id,
            transport = ?playback.transport,
            "playback session created via SETUP"
        );
        client.playback = Some(playback);

        if !client.announced {
            client.announced = true;
            self.listener.on_display_connected(&DisplayInfo {
                remote_addr: client.remote_addr,
                local_addr: client.local_addr,
                session_id: id,
            });
        }
        Ok(response)
    }

    /// M7: start (or resume) streaming and arm the keep-alive.
    fn handle_play(&mut self, cseq: u32, request: &RtspRequest, now: Instant) -> Result<RtspResponse> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        let playback = client
            .matching_playback(request.session_id())
            .ok_or(SessionStateError::SessionNotFound)?;
        if playback.is_playing() {
            return Err(SessionStateError::InvalidState { method: "PLAY" }.into());
        }

        playback.start()?;
        let session = playback.session_header_value(self.config.session_timeout_secs);
        tracing::info!(session_id = %playback.id, "playback started");

        self.arm_keepalive(now);
        Ok(reply(cseq)
            .add_header("Session", &session)
            .add_header("Range", "npt=now-"))
    }

    /// M9: suspend streaming.
    fn handle_pause(&mut self, cseq: u32, request: &RtspRequest) -> Result<RtspResponse> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        let playback = client
            .matching_playback(request.session_id())
            .ok_or(SessionStateError::SessionNotFound)?;
        if !playback.is_playing() {
            return Err(SessionStateError::InvalidState { method: "PAUSE" }.into());
        }

        playback.pause()?;
        tracing::info!(session_id = %playback.id, "playback paused");
        Ok(reply(cseq).add_header(
            "Session",
            &playback.session_header_value(self.config.session_timeout_secs),
        ))
    }

    /// M8: destroy the playback session. The connection stays open.
    fn handle_teardown(&mut self, cseq: u32, request: &RtspRequest) -> Result<RtspResponse> {
        let requested = request.session_id().and_then(PlaybackSessionId::parse);
        let client = self.client.as_mut().ok_or_else(no_client)?;
        let playback = client
            .playback
            .take_if(|playback| Some(playback.id) == requested)
            .ok_or(SessionStateError::SessionNotFound)?;

        let id = playback.id;
        let session = playback.session_header_value(self.config.session_timeout_secs);
        self.cancel_keepalive();
        playback.teardown()?;
        tracing::info!(session_id = %id, "playback session torn down via TEARDOWN");
        Ok(reply(cseq).add_header("Session", &session))
    }

    /// Parameter query from the sink, or an empty-body keep-alive.
    fn handle_get_parameter(&mut self, cseq: u32, request: &RtspRequest) -> Result<RtspResponse> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        let session = checked_session(client, request, self.config.session_timeout_secs)?;
        let mut response = reply(cseq);
        if let Some(session) = &session {
            response = response.add_header("Session", session);
        }

        let names = Parameters::requested_names(request.body.as_deref().unwrap_or(""));
        if names.is_empty() {
            return Ok(response);
        }

        let selected = selected_parameters(&self.config, client);
        let mut answer = Parameters::new();
        for name in names {
            match selected.get(name).or_else(|| client.sink_params.get(name)) {
                Some(value) => answer.set(name, value),
                None => tracing::debug!(parameter = name, "sink asked for an unknown parameter"),
            }
        }
        Ok(response.with_body(TEXT_PARAMETERS, answer.to_body()))
    }

    /// Parameter update from the sink, or an empty-body keep-alive.
    fn handle_set_parameter(&mut self, cseq: u32, request: &RtspRequest) -> Result<RtspResponse> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        let session = checked_session(client, request, self.config.session_timeout_secs)?;

        let params = Parameters::parse(request.body.as_deref().unwrap_or(""))
            .map_err(|_| SessionStateError::BadRequest("malformed parameter body"))?;
        if !params.is_empty() {
            tracing::debug!(conn = %client.conn, count = params.len(), "sink updated parameters");
            client.sink_params.merge(&params);
        }

        let mut response = reply(cseq);
        if let Some(session) = &session {
            response = response.add_header("Session", session);
        }
        Ok(response)
    }
}
