//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Wi-Fi Display streams are a single MPEG-2 transport stream carrying
//! both audio and video, so the description has one `m=` line with the
//! static MP2T payload type (RFC 3551 §6):
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 <addr>
//! s=<session-name>
//! c=IN IP4 <addr>
//! t=0 0
//! a=tool:wfd-rs
//! a=sendonly
//! m=video 0 RTP/AVP 33
//! a=rtpmap:33 MP2T/90000
//! a=control:streamid=0
//! ```
//!
//! The session name comes from [`SourceConfig`](crate::SourceConfig).

use crate::source::SourceConfig;

/// Static RTP payload type for MPEG-2 transport streams.
pub const MP2T_PAYLOAD_TYPE: u8 = 33;

/// Generate the DESCRIBE body for a source reachable at `ip`.
pub fn generate_sdp(config: &SourceConfig, ip: &str) -> String {
    let sdp = [
        "v=0".to_string(),
        format!("o=- 0 0 IN IP4 {ip}"),
        format!("s={}", config.sdp_session_name),
        format!("c=IN IP4 {ip}"),
        "t=0 0".to_string(),
        "a=tool:wfd-rs".to_string(),
        "a=sendonly".to_string(),
        format!("m=video 0 RTP/AVP {MP2T_PAYLOAD_TYPE}"),
        format!("a=rtpmap:{MP2T_PAYLOAD_TYPE} MP2T/90000"),
        "a=control:streamid=0".to_string(),
    ];

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_mp2t_sdp() {
        let config = SourceConfig {
            sdp_session_name: "Living Room".to_string(),
            ..SourceConfig::default()
        };
        let sdp = generate_sdp(&config, "192.168.49.1");
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 0 0 IN IP4 192.168.49.1\r\n"));
        assert!(sdp.contains("s=Living Room\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.49.1\r\n"));
        assert!(sdp.contains("a=rtpmap:33 MP2T/90000\r\n"));

        let sendonly_idx = sdp.find("a=sendonly").expect("SDP must include sendonly");
        let m_idx = sdp.find("m=video").expect("SDP must include media section");
        assert!(
            sendonly_idx < m_idx,
            "session-level attrs must precede m= line"
        );
        assert!(sdp.ends_with("a=control:streamid=0\r\n"));
    }
}
