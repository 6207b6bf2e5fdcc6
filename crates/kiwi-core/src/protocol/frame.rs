//! Parses length-tagged WebSocket payloads into typed [`Frame`]s.
//!
//! Every message is `tag:[u8; 3]` followed by a tag-specific body. Frames
//! own their payload bytes exclusively until handed to the sample
//! pipeline.

use crate::error::KiwiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgParam {
    pub key: String,
    /// `None` for a bare key with no `=value` suffix.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Msg(Vec<MsgParam>),
    Snd {
        flags: u8,
        seq: u32,
        smeter: u16,
        body: Vec<u8>,
    },
    Wf {
        x_bin: u32,
        flags_zoom: u32,
        seq: u32,
        body: Vec<u8>,
    },
}

impl Frame {
    /// `rssi_dbm = 0.1*smeter - 127`, as derived from the 8-bit S-meter.
    pub fn snd_rssi_dbm(smeter: u16) -> f32 {
        0.1 * smeter as f32 - 127.0
    }
}

pub struct FrameCodec;

impl FrameCodec {
    /// Decodes one raw WebSocket binary payload. Unrecognized tags are
    /// reported as a protocol error for the caller to log and ignore.
    pub fn decode(data: &[u8]) -> Result<Frame, KiwiError> {
        if data.len() < 3 {
            return Err(KiwiError::Protocol("frame shorter than tag".into()));
        }
        let tag = &data[..3];
        let rest = &data[3..];
        match tag {
            b"MSG" => Self::decode_msg(rest),
            b"SND" => Self::decode_snd(rest),
            b"W/F" => Self::decode_wf(rest),
            other => Err(KiwiError::Protocol(format!(
                "unrecognized frame tag {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn decode_msg(rest: &[u8]) -> Result<Frame, KiwiError> {
        if rest.is_empty() {
            return Err(KiwiError::Protocol("MSG frame missing skipped byte".into()));
        }
        let text = String::from_utf8_lossy(&rest[1..]);
        let params = text
            .split_ascii_whitespace()
            .map(|token| match token.split_once('=') {
                Some((k, v)) => MsgParam {
                    key: k.to_string(),
                    value: Some(v.to_string()),
                },
                None => MsgParam {
                    key: token.to_string(),
                    value: None,
                },
            })
            .collect();
        Ok(Frame::Msg(params))
    }

    fn decode_snd(rest: &[u8]) -> Result<Frame, KiwiError> {
        if rest.len() < 7 {
            return Err(KiwiError::Protocol("SND header truncated".into()));
        }
        let flags = rest[0];
        let seq = u32::from_le_bytes([rest[1], rest[2], rest[3], rest[4]]);
        let smeter = u16::from_be_bytes([rest[5], rest[6]]);
        let body = rest[7..].to_vec();
        Ok(Frame::Snd {
            flags,
            seq,
            smeter,
            body,
        })
    }

    fn decode_wf(rest: &[u8]) -> Result<Frame, KiwiError> {
        if rest.len() < 13 {
            return Err(KiwiError::Protocol("W/F header truncated".into()));
        }
        let header = &rest[1..13];
        let x_bin = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let flags_zoom = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let seq = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let body = rest[13..].to_vec();
        Ok(Frame::Wf {
            x_bin,
            flags_zoom,
            seq,
            body,
        })
    }
}

/// Parses the GPS sub-header present in the first 10 bytes of an IQ-mode
/// `SND` payload: `last_solution:u8, pad:u8, gpssec:u32 LE, gpsnsec:u32 LE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsHeader {
    pub last_solution: u8,
    pub gpssec: u32,
    pub gpsnsec: u32,
}

impl GpsHeader {
    pub const WIRE_LEN: usize = 10;

    pub fn parse(body: &[u8]) -> Option<(Self, &[u8])> {
        if body.len() < Self::WIRE_LEN {
            return None;
        }
        let last_solution = body[0];
        let gpssec = u32::from_le_bytes([body[2], body[3], body[4], body[5]]);
        let gpsnsec = u32::from_le_bytes([body[6], body[7], body[8], body[9]]);
        Some((
            Self {
                last_solution,
                gpssec,
                gpsnsec,
            },
            &body[Self::WIRE_LEN..],
        ))
    }

    /// The original's convention for "no recent GPS solution": 254 or 255.
    pub fn is_unavailable(&self) -> bool {
        self.last_solution == 254 || self.last_solution == 255
    }
}
