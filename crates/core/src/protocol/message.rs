use crate::error::{ParseErrorKind, WfdError};
use crate::protocol::{RtspRequest, RtspResponse};

/// Any message that can arrive on the control connection.
///
/// Both peers act as RTSP client and server on the same socket, so the
/// start line decides: `RTSP/1.0 <code> ...` is a response to one of our
/// requests, anything else is a request from the sink.
#[derive(Debug, Clone)]
pub enum RtspMessage {
    Request(RtspRequest),
    Response(RtspResponse),
}

impl RtspMessage {
    /// Parse one complete, framed message.
    pub fn parse(raw: &[u8]) -> crate::error::Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| WfdError::Parse {
            kind: ParseErrorKind::InvalidEncoding,
        })?;
        let text = text.trim_start_matches(['\r', '\n']);

        if text.starts_with("RTSP/") {
            RtspResponse::parse(text).map(RtspMessage::Response)
        } else {
            RtspRequest::parse(text).map(RtspMessage::Request)
        }
    }

    pub fn cseq(&self) -> Option<u32> {
        match self {
            RtspMessage::Request(request) => request.cseq(),
            RtspMessage::Response(response) => response.cseq(),
        }
    }
}
