//! `text/parameters` bodies carried by GET_PARAMETER/SET_PARAMETER.
//!
//! A GET_PARAMETER request lists parameter names, one per line. Replies and
//! SET_PARAMETER requests carry `name: value` lines:
//!
//! ```text
//! wfd_video_formats: 00 00 02 04 0001FFFF 1FFFFFFF 00000FFF 00 0000 0000 00 none none
//! wfd_audio_codecs: AAC 00000001 00
//! wfd_client_rtp_ports: RTP/AVP/UDP;unicast 19000 0 mode=play
//! ```

use std::fmt;

use crate::error::{ParseErrorKind, WfdError};

pub const WFD_VIDEO_FORMATS: &str = "wfd_video_formats";
pub const WFD_AUDIO_CODECS: &str = "wfd_audio_codecs";
pub const WFD_CLIENT_RTP_PORTS: &str = "wfd_client_rtp_ports";
pub const WFD_PRESENTATION_URL: &str = "wfd_presentation_URL";
pub const WFD_TRIGGER_METHOD: &str = "wfd_trigger_method";

/// Ordered set of WFD parameters. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `name: value` body. Blank lines are skipped.
    pub fn parse(body: &str) -> crate::error::Result<Self> {
        let mut params = Parameters::new();
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (name, value) = line.split_once(':').ok_or(WfdError::Parse {
                kind: ParseErrorKind::InvalidParameter,
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(WfdError::Parse {
                    kind: ParseErrorKind::InvalidParameter,
                });
            }
            params.set(name, value.trim());
        }
        Ok(params)
    }

    /// Parameter names requested by a GET_PARAMETER body.
    pub fn requested_names(body: &str) -> Vec<&str> {
        body.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Insert or replace a parameter, keeping the original position on replace.
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    pub fn merge(&mut self, other: &Parameters) {
        for (name, value) in &other.entries {
            self.set(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Body of a GET_PARAMETER request asking for `names`.
    pub fn query_body(names: &[&str]) -> String {
        names.iter().map(|name| format!("{name}\r\n")).collect()
    }

    /// Serialize as a `text/parameters` body.
    pub fn to_body(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}: {value}\r\n"))
            .collect()
    }
}

/// The sink's RTP receive ports from `wfd_client_rtp_ports`.
///
/// Only the primary-sink UDP form is supported:
/// `RTP/AVP/UDP;unicast <port0> 0 mode=play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRtpPorts {
    pub port0: u16,
    pub port1: u16,
}

impl ClientRtpPorts {
    pub fn parse(value: &str) -> Option<Self> {
        let mut fields = value.split_whitespace();
        if fields.next()? != "RTP/AVP/UDP;unicast" {
            return None;
        }
        let port0: u16 = fields.next()?.parse().ok()?;
        let port1: u16 = fields.next()?.parse().ok()?;
        if fields.next()? != "mode=play" || fields.next().is_some() {
            return None;
        }
        if port0 == 0 || port1 != 0 {
            return None;
        }
        Some(ClientRtpPorts { port0, port1 })
    }
}

impl fmt::Display for ClientRtpPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP/AVP/UDP;unicast {} {} mode=play",
            self.port0, self.port1
        )
    }
}
