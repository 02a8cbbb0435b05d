use crate::error::SessionStateError;

/// Transport requested by the sink in SETUP (RFC 2326 §12.39).
///
/// Wi-Fi Display sinks ask for UDP unicast on the port announced in
/// `wfd_client_rtp_ports`; some also accept TCP interleaving.
///
/// ## Wire format example
///
/// ```text
/// Sink → Source:
///   Transport: RTP/AVP/UDP;unicast;client_port=19000
///
/// Source → Sink:
///   Transport: RTP/AVP/UDP;unicast;client_port=19000;server_port=15550-15551
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportHeader {
    /// `RTP/AVP[/UDP];unicast;client_port=RTP[-RTCP]`
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: Option<u16>,
    },
    /// `RTP/AVP/TCP;interleaved=RTP[-RTCP]`
    TcpInterleaved {
        rtp_channel: u8,
        rtcp_channel: Option<u8>,
    },
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// A recognizable profile with missing or malformed ports is a bad
    /// request; multicast or an unknown profile is an unsupported transport.
    ///
    /// ## Examples
    ///
    /// ```
    /// use wfd::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP/UDP;unicast;client_port=19000-19001").unwrap();
    /// assert_eq!(
    ///     th,
    ///     TransportHeader::Udp { client_rtp_port: 19000, client_rtcp_port: Some(19001) }
    /// );
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;multicast").is_err());
    /// ```
    pub fn parse(header: &str) -> Result<Self, SessionStateError> {
        let mut parts = header.split(';').map(str::trim);
        let profile = parts.next().unwrap_or("");

        let tcp = match profile {
            "RTP/AVP" | "RTP/AVP/UDP" => false,
            "RTP/AVP/TCP" => true,
            _ => return Err(SessionStateError::UnsupportedTransport(header.to_string())),
        };

        let mut ports = None;
        for part in parts {
            if part.eq_ignore_ascii_case("multicast") {
                return Err(SessionStateError::UnsupportedTransport(header.to_string()));
            }
            let key = if tcp { "interleaved=" } else { "client_port=" };
            if let Some(value) = part.strip_prefix(key) {
                ports = Some(value);
            }
        }

        let ports = ports.ok_or(SessionStateError::BadRequest(if tcp {
            "Transport without interleaved channels"
        } else {
            "Transport without client_port"
        }))?;

        let malformed = SessionStateError::BadRequest("malformed Transport port range");
        if tcp {
            let (rtp_channel, rtcp_channel) = parse_range::<u8>(ports).ok_or(malformed)?;
            Ok(TransportHeader::TcpInterleaved {
                rtp_channel,
                rtcp_channel,
            })
        } else {
            let (client_rtp_port, client_rtcp_port) =
                parse_range::<u16>(ports).ok_or(malformed)?;
            if client_rtp_port == 0 {
                return Err(SessionStateError::BadRequest("client_port must be nonzero"));
            }
            Ok(TransportHeader::Udp {
                client_rtp_port,
                client_rtcp_port,
            })
        }
    }

    /// Value of the `Transport` header in the SETUP reply.
    pub fn reply(&self, server_rtp_port: u16) -> String {
        match self {
            TransportHeader::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => {
                let client = match client_rtcp_port {
                    Some(rtcp) => format!("{client_rtp_port}-{rtcp}"),
                    None => client_rtp_port.to_string(),
                };
                format!(
                    "RTP/AVP/UDP;unicast;client_port={client};server_port={}-{}",
                    server_rtp_port,
                    server_rtp_port.saturating_add(1)
                )
            }
            TransportHeader::TcpInterleaved {
                rtp_channel,
                rtcp_channel,
            } => match rtcp_channel {
                Some(rtcp) => format!("RTP/AVP/TCP;interleaved={rtp_channel}-{rtcp}"),
                None => format!("RTP/AVP/TCP;interleaved={rtp_channel}"),
            },
        }
    }
}

/// Parse `A` or `A-B`.
fn parse_range<T: std::str::FromStr>(value: &str) -> Option<(T, Option<T>)> {
    match value.split_once('-') {
        Some((first, second)) => Some((first.parse().ok()?, Some(second.parse().ok()?))),
        None => Some((value.parse().ok()?, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_single_port() {
        let th = TransportHeader::parse("RTP/AVP/UDP;unicast;client_port=19000").unwrap();
        assert_eq!(
            th,
            TransportHeader::Udp {
                client_rtp_port: 19000,
                client_rtcp_port: None
            }
        );
        assert_eq!(
            th.reply(15550),
            "RTP/AVP/UDP;unicast;client_port=19000;server_port=15550-15551"
        );
    }

    #[test]
    fn parse_plain_avp_with_pair() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000-5001;mode=play").unwrap();
        assert_eq!(
            th.reply(6000),
            "RTP/AVP/UDP;unicast;client_port=5000-5001;server_port=6000-6001"
        );
    }

    #[test]
    fn parse_tcp_interleaved() {
        let th = TransportHeader::parse("RTP/AVP/TCP;interleaved=0-1").unwrap();
        assert_eq!(
            th,
            TransportHeader::TcpInterleaved {
                rtp_channel: 0,
                rtcp_channel: Some(1)
            }
        );
        assert_eq!(th.reply(0), "RTP/AVP/TCP;interleaved=0-1");
    }

    #[test]
    fn parse_no_client_port() {
        assert!(matches!(
            TransportHeader::parse("RTP/AVP/UDP;unicast"),
            Err(SessionStateError::BadRequest(_))
        ));
        assert!(matches!(
            TransportHeader::parse("RTP/AVP/UDP;unicast;client_port=abc"),
            Err(SessionStateError::BadRequest(_))
        ));
    }

    #[test]
    fn parse_unsupported() {
        assert!(matches!(
            TransportHeader::parse("RTP/AVP;multicast;client_port=5000"),
            Err(SessionStateError::UnsupportedTransport(_))
        ));
        assert!(matches!(
            TransportHeader::parse("RAW/RAW/UDP;unicast;client_port=5000"),
            Err(SessionStateError::UnsupportedTransport(_))
        ));
    }
}
