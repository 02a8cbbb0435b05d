//! Source-driven capability negotiation (M1, M3, M4, M5).
//!
//! Each step is sent only after the previous step's response arrived and
//! passed validation, so the sink always sees them in order. A failed step
//! disconnects the client.

use tokio::time::Instant;

use super::{ResponseHandler, SessionController, no_client, reason_for};
use crate::error::{Result, WfdError};
use crate::protocol::params::{
    WFD_AUDIO_CODECS, WFD_CLIENT_RTP_PORTS, WFD_PRESENTATION_URL, WFD_TRIGGER_METHOD,
    WFD_VIDEO_FORMATS,
};
use crate::protocol::{
    ClientRtpPorts, Parameters, RtspRequest, RtspResponse, TEXT_PARAMETERS, WFD_CONTROL_URI,
    WFD_OPTION_TAG,
};
use crate::session::{ClientRecord, HandshakeStage};
use crate::source::SourceConfig;
use crate::transport::ConnectionId;

/// Methods the sink must list in its M1 `Public` header.
const REQUIRED_SINK_METHODS: [&str; 3] = [WFD_OPTION_TAG, "GET_PARAMETER", "SET_PARAMETER"];

/// Parameters queried in M3.
const QUERIED_PARAMETERS: [&str; 3] = [WFD_VIDEO_FORMATS, WFD_AUDIO_CODECS, WFD_CLIENT_RTP_PORTS];

/// The parameters this source selects for the client, as sent in M4.
pub(super) fn selected_parameters(config: &SourceConfig, client: &ClientRecord) -> Parameters {
    let mut params = Parameters::new()
        .with(WFD_VIDEO_FORMATS, &config.video_formats)
        .with(WFD_AUDIO_CODECS, &config.audio_codecs)
        .with(
            WFD_PRESENTATION_URL,
            &format!("rtsp://{}/wfd1.0/streamid=0 none", client.local_addr.ip()),
        );
    if let Some(ports) = client.rtp_ports {
        params.set(WFD_CLIENT_RTP_PORTS, &ports.to_string());
    }
    params
}

impl SessionController {
    /// M1: `OPTIONS * RTSP/1.0` with `Require: org.wfa.wfd1.0`.
    pub(super) fn send_capability_discovery(&mut self, conn: ConnectionId) {
        let request = RtspRequest::new("OPTIONS", "*").add_header("Require", WFD_OPTION_TAG);
        self.send_request(conn, request, ResponseHandler::CapabilityDiscovery);
    }

    /// Route a response from the sink to the continuation registered for it.
    pub(super) fn on_response(&mut self, conn: ConnectionId, response: RtspResponse, now: Instant) {
        let Some(cseq) = response.cseq() else {
            tracing::warn!(%conn, status = response.status_code, "response without CSeq");
            self.disconnect_client(super::DisconnectReason::Protocol);
            return;
        };
        let Some(handler) = self.responses.take(conn, cseq) else {
            tracing::debug!(%conn, cseq, status = response.status_code, "dropping unsolicited response");
            return;
        };
        tracing::debug!(%conn, cseq, status = response.status_code, ?handler, "response");

        let result = match handler {
            ResponseHandler::CapabilityDiscovery => self.on_capability_discovery(conn, &response),
            ResponseHandler::ParameterQuery => self.on_parameter_query(conn, &response),
            ResponseHandler::ParameterSet => self.on_parameter_set(conn, &response),
            ResponseHandler::SetupTrigger => self.on_setup_trigger(conn, &response),
            ResponseHandler::KeepAlive => {
                self.on_keepalive_response(cseq, &response, now);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(%conn, cseq, ?handler, error = %e, "capability negotiation failed");
            self.disconnect_client(reason_for(&e));
        }
    }

    fn on_capability_discovery(&mut self, conn: ConnectionId, response: &RtspResponse) -> Result<()> {
        self.expect_stage(HandshakeStage::CapabilityDiscovery)?;
        check_status(response, "M1")?;

        let public = response
            .get_header("Public")
            .ok_or_else(|| WfdError::Negotiation("M1 reply has no Public header".to_string()))?;
        let methods: Vec<&str> = public.split(',').map(str::trim).collect();
        for required in REQUIRED_SINK_METHODS {
            if !methods.iter().any(|m| m.eq_ignore_ascii_case(required)) {
                return Err(WfdError::Negotiation(format!(
                    "sink does not support {required}"
                )));
            }
        }

        self.set_stage(HandshakeStage::ParameterQuery)?;
        let request = RtspRequest::new("GET_PARAMETER", WFD_CONTROL_URI)
            .with_body(TEXT_PARAMETERS, Parameters::query_body(&QUERIED_PARAMETERS));
        self.send_request(conn, request, ResponseHandler::ParameterQuery);
        Ok(())
    }

    fn on_parameter_query(&mut self, conn: ConnectionId, response: &RtspResponse) -> Result<()> {
        self.expect_stage(HandshakeStage::ParameterQuery)?;
        check_status(response, "M3")?;

        let params = Parameters::parse(response.body.as_deref().unwrap_or(""))
            .map_err(|e| WfdError::Negotiation(format!("malformed M3 reply: {e}")))?;
        let ports = match params.get(WFD_CLIENT_RTP_PORTS) {
            Some(value) => ClientRtpPorts::parse(value).ok_or_else(|| {
                WfdError::Negotiation(format!("unsupported {WFD_CLIENT_RTP_PORTS}: {value}"))
            })?,
            None => {
                return Err(WfdError::Negotiation(format!(
                    "M3 reply has no {WFD_CLIENT_RTP_PORTS}"
                )));
            }
        };

        tracing::info!(
            %conn,
            rtp_port = ports.port0,
            video_formats = params.get(WFD_VIDEO_FORMATS).unwrap_or("none"),
            audio_codecs = params.get(WFD_AUDIO_CODECS).unwrap_or("none"),
            "sink capabilities"
        );

        let client = self.client.as_mut().ok_or_else(no_client)?;
        client.sink_params = params;
        client.rtp_ports = Some(ports);
        client.handshake = HandshakeStage::ParameterSet;

        let body = selected_parameters(&self.config, client).to_body();
        let request = RtspRequest::new("SET_PARAMETER", WFD_CONTROL_URI)
            .with_body(TEXT_PARAMETERS, body);
        self.send_request(conn, request, ResponseHandler::ParameterSet);
        Ok(())
    }

    fn on_parameter_set(&mut self, conn: ConnectionId, response: &RtspResponse) -> Result<()> {
        self.expect_stage(HandshakeStage::ParameterSet)?;
        check_status(response, "M4")?;

        self.set_stage(HandshakeStage::SetupTrigger)?;
        let body = Parameters::new().with(WFD_TRIGGER_METHOD, "SETUP").to_body();
        let request = RtspRequest::new("SET_PARAMETER", WFD_CONTROL_URI)
            .with_body(TEXT_PARAMETERS, body);
        self.send_request(conn, request, ResponseHandler::SetupTrigger);
        Ok(())
    }

    fn on_setup_trigger(&mut self, conn: ConnectionId, response: &RtspResponse) -> Result<()> {
        self.expect_stage(HandshakeStage::SetupTrigger)?;
        check_status(response, "M5")?;

        self.set_stage(HandshakeStage::Complete)?;
        tracing::info!(%conn, "capability negotiation complete, waiting for SETUP");
        Ok(())
    }

    fn expect_stage(&self, expected: HandshakeStage) -> Result<()> {
        let stage = self.client.as_ref().ok_or_else(no_client)?.handshake;
        if stage != expected {
            return Err(WfdError::Protocol(format!(
                "response for {expected:?} arrived in stage {stage:?}"
            )));
        }
        Ok(())
    }

    fn set_stage(&mut self, stage: HandshakeStage) -> Result<()> {
        let client = self.client.as_mut().ok_or_else(no_client)?;
        tracing::debug!(conn = %client.conn, old_stage = ?client.handshake, new_stage = ?stage, "handshake");
        client.handshake = stage;
        Ok(())
    }
}

fn check_status(response: &RtspResponse, step: &str) -> Result<()> {
    if !response.is_success() {
        return Err(WfdError::Negotiation(format!(
            "sink answered {step} with {} {}",
            response.status_code, response.status_text
        )));
    }
    Ok(())
}
