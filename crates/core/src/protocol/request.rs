use crate::error::{ParseErrorKind, WfdError};
use crate::protocol::{find_header, parse_headers, split_head, write_tail};

/// An RTSP request (RFC 2326 §6), either received from the sink or built
/// by the source.
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. Outgoing requests
/// use the same builder shape as [`RtspResponse`](super::RtspResponse).
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, SETUP, GET_PARAMETER, ...).
    pub method: String,
    /// Request-URI (`*`, `rtsp://localhost/wfd1.0`, ...).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs, names stored as-received.
    pub headers: Vec<(String, String)>,
    /// Message body, if any (WFD bodies are `text/parameters`).
    pub body: Option<String>,
}

impl RtspRequest {
    /// Start building an outgoing `RTSP/1.0` request.
    pub fn new(method: &str, uri: &str) -> Self {
        RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Parse an RTSP request from its text representation.
    ///
    /// Expects a complete request: request line, headers, blank line and
    /// the body (if any). Returns [`WfdError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let (head, body) = split_head(raw);
        let mut lines = head.lines();

        let request_line = lines.next().filter(|l| !l.trim().is_empty()).ok_or(
            WfdError::Parse {
                kind: ParseErrorKind::EmptyMessage,
            },
        )?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(WfdError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let version = parts[2].to_string();
        if version != "RTSP/1.0" {
            tracing::warn!(version, "peer sent non-RTSP/1.0 version");
        }

        Ok(RtspRequest {
            method: parts[0].to_string(),
            uri: parts[1].to_string(),
            version,
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
        let mut request = self.add_header("Content-Type", content_type);
        request.body = Some(body);
        request
    }

    /// Put the `CSeq` header first, replacing any existing one.
    pub fn with_cseq(mut self, cseq: u32) -> Self {
        self.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("CSeq"));
        self.headers
            .insert(0, ("CSeq".to_string(), cseq.to_string()));
        self
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the CSeq, which numbers and orders RTSP request/response
    /// pairs (RFC 2326 §12.17). `None` if absent or not a number.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq")?.trim().parse().ok()
    }

    /// Session identifier from the `Session` header, without the
    /// `;timeout=` suffix.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);
        write_tail(&mut request, &self.headers, self.body.as_deref());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nRequire: org.wfa.wfd1.0\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "*");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), Some(1));
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_setup_with_transport() {
        let raw = "SETUP rtsp://192.168.49.1/wfd1.0/streamid=0 RTSP/1.0\r\n\
                   CSeq: 3\r\n\
                   Transport: RTP/AVP/UDP;unicast;client_port=19000\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(req.cseq(), Some(3));
        assert_eq!(
            req.get_header("Transport"),
            Some("RTP/AVP/UDP;unicast;client_port=19000")
        );
    }

    #[test]
    fn parse_set_parameter_with_body() {
        let raw = "SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\n\
                   CSeq: 9\r\n\
                   Content-Type: text/parameters\r\n\
                   Content-Length: 17\r\n\r\n\
                   wfd_idr_request\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.body.as_deref(), Some("wfd_idr_request\r\n"));
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\n\r\n").is_err());
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "PLAY rtsp://localhost RTSP/1.0\r\ncseq: 42\r\nsession: 7;timeout=30\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.get_header("CSeq"), Some("42"));
        assert_eq!(req.cseq(), Some(42));
        assert_eq!(req.session_id(), Some("7"));
    }

    #[test]
    fn non_numeric_cseq_is_none() {
        let req = RtspRequest::parse("OPTIONS * RTSP/1.0\r\nCSeq: x\r\n\r\n").unwrap();
        assert_eq!(req.cseq(), None);
    }

    #[test]
    fn serialize_outgoing_with_body() {
        let req = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0")
            .with_body("text/parameters", "wfd_trigger_method: SETUP\r\n".to_string())
            .with_cseq(4);
        let s = req.serialize();
        assert!(s.starts_with("SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 4\r\n"));
        assert!(s.contains("Content-Type: text/parameters\r\n"));
        assert!(s.contains("Content-Length: 27\r\n\r\n"));
        assert!(s.ends_with("wfd_trigger_method: SETUP\r\n"));
    }
}
