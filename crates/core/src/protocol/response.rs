use crate::error::{ParseErrorKind, WfdError};
use crate::protocol::{find_header, parse_headers, split_head, write_tail};

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: text/parameters\r\n
/// Content-Length: 42\r\n
/// \r\n
/// wfd_client_rtp_ports: RTP/AVP/UDP;unicast 19000 0 mode=play\r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// Responses from the sink come in through [`parse`](Self::parse).
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "wfd-rs/0.1";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
            body: None,
        }
    }

    /// 200 OK: success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request: malformed or missing required header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 500 Internal Server Error: the playback pipeline failed.
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    /// Parse a response received from the sink.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let (head, body) = split_head(raw);
        let mut lines = head.lines();

        let status_line = lines.next().filter(|l| !l.trim().is_empty()).ok_or(
            WfdError::Parse {
                kind: ParseErrorKind::EmptyMessage,
            },
        )?;

        let mut parts = status_line.splitn(3, ' ');
        let invalid = || WfdError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        };

        let version = parts.next().ok_or_else(invalid)?;
        if !version.starts_with("RTSP/") {
            return Err(invalid());
        }
        let status_code: u16 = parts
            .next()
            .and_then(|code| code.trim().parse().ok())
            .ok_or_else(invalid)?;
        let status_text = parts.next().unwrap_or("").trim().to_string();

        Ok(RtspResponse {
            status_code,
            status_text,
            headers: parse_headers(lines)?,
            body: body.map(str::to_string),
        })
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach a body together with its `Content-Type`.
    pub fn with_body(self, content_type: &str, body: String) -> Self {
        let mut response = self.add_header("Content-Type", content_type);
        response.body = Some(body);
        response
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// CSeq of the request this response answers.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq")?.trim().parse().ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);
        write_tail(&mut response, &self.headers, self.body.as_deref());
        response
    }
}
