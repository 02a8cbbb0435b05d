//! RTSP message codec for the Wi-Fi Display control channel.
//!
//! Wi-Fi Display runs RTSP in both directions over a single TCP
//! connection: the source sends requests to the sink during capability
//! negotiation and keep-alive, and serves the requests the sink sends for
//! session control. This module parses either kind of message, builds
//! outgoing requests and responses, and handles the `text/parameters`
//! bodies and the SDP description used by the exchange.
//!
//! ## Message numbering (Wi-Fi Display Technical Specification §6.4)
//!
//! | Msg | Direction | Method | Purpose |
//! |-----|-----------|--------|---------|
//! | M1 | source → sink | OPTIONS | Discover the sink's RTSP methods |
//! | M2 | sink → source | OPTIONS | Discover the source's RTSP methods |
//! | M3 | source → sink | GET_PARAMETER | Query sink capabilities |
//! | M4 | source → sink | SET_PARAMETER | Select parameters and RTP ports |
//! | M5 | source → sink | SET_PARAMETER | Trigger the sink to send SETUP |
//! | M6 | sink → source | SETUP | Create the playback session |
//! | M7 | sink → source | PLAY | Start streaming |
//! | M8 | sink → source | TEARDOWN | Destroy the playback session |
//! | M9 | sink → source | PAUSE | Suspend streaming |
//! | M16 | source → sink | GET_PARAMETER | Keep-alive |

pub mod message;
pub mod params;
pub mod request;
pub mod response;
pub mod sdp;

pub use message::RtspMessage;
pub use params::{ClientRtpPorts, Parameters};
pub use request::RtspRequest;
pub use response::RtspResponse;

/// RTSP extension token advertised by Wi-Fi Display peers in `Require`/`Public`.
pub const WFD_OPTION_TAG: &str = "org.wfa.wfd1.0";

/// Request-URI used for source-initiated GET_PARAMETER/SET_PARAMETER.
pub const WFD_CONTROL_URI: &str = "rtsp://localhost/wfd1.0";

/// Content type of parameter bodies.
pub const TEXT_PARAMETERS: &str = "text/parameters";

/// Split a message into its header block and body.
///
/// The header block ends at the first empty line; whatever follows is the
/// body. Both CRLF and bare LF line endings are accepted.
pub(crate) fn split_head(raw: &str) -> (&str, Option<&str>) {
    let (head, body) = match raw.find("\r\n\r\n") {
        Some(i) => (&raw[..i], &raw[i + 4..]),
        None => match raw.find("\n\n") {
            Some(i) => (&raw[..i], &raw[i + 2..]),
            None => (raw, ""),
        },
    };
    (head, (!body.is_empty()).then_some(body))
}

/// Parse `Name: value` header lines, stopping at the first empty line.
pub(crate) fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> crate::error::Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let colon_pos = line.find(':').ok_or(crate::WfdError::Parse {
            kind: crate::error::ParseErrorKind::InvalidHeader,
        })?;

        headers.push((
            line[..colon_pos].trim().to_string(),
            line[colon_pos + 1..].trim().to_string(),
        ));
    }
    Ok(headers)
}

/// Case-insensitive header lookup (RFC 2326 §4.2).
pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Write headers and an optional body in wire format.
///
/// `Content-Length` is appended automatically when a body is present
/// (RFC 2326 §12.14).
pub(crate) fn write_tail(out: &mut String, headers: &[(String, String)], body: Option<&str>) {
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }

    match body {
        Some(body) => {
            out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            out.push_str(body);
        }
        None => out.push_str("\r\n"),
    }
}
