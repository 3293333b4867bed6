//! Mapping between reassembled message bytes and typed payload values.
//!
//! Length prefixes inside the negotiation payload are big-endian, unlike
//! the little-endian fields of the frame header; the asymmetry is the
//! protocol's, not ours.

use alloc::string::String;
use alloc::vec::Vec;

use crate::decoder::Message;
use crate::frame::{ControlSubtype, DataSubtype, FrameControl, FrameKind};

/// One decoded payload value with the flags of the frames that carried it
/// (masked to {encrypted, checksummed, direction, ack}).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub frame_control: FrameControl,
    pub body: PayloadBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    /// Acknowledges the peer frame with the given sequence number.
    Ack { request_sequence: u8 },
    /// Negotiation message 0: the peer announces the byte length of the
    /// negotiation data to follow.
    Negotiation0 { pkg_len: u16 },
    /// Negotiation message 1: the peer's group parameters and public key.
    Negotiation1(NegotiationParams),
    SecurityMode { checksum_enabled: bool },
    WifiOpMode(WifiOpMode),
    CustomData(Vec<u8>),
    GetWifiList,
    Ssid(String),
    Password(String),
    ConnectAp,
}

/// Group parameters carried by negotiation message 1, each prefixed by a
/// big-endian 16-bit length on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationParams {
    pub prime: Vec<u8>,
    pub generator: Vec<u8>,
    pub pubkey: Vec<u8>,
}

/// The Wi-Fi operating mode the peer asks the device to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WifiOpMode {
    Null = 0,
    Sta = 1,
    SoftAp = 2,
    SoftApAndSta = 3,
}

impl TryFrom<u8> for WifiOpMode {
    type Error = PayloadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => WifiOpMode::Null,
            1 => WifiOpMode::Sta,
            2 => WifiOpMode::SoftAp,
            3 => WifiOpMode::SoftApAndSta,
            _ => return Err(PayloadError::OpModeOutOfRange { value }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// A fixed-size payload arrived with the wrong length.
    WrongSize { have: usize, need: usize },
    /// A length-prefixed field ran past the end of the content.
    Truncated { have: usize, need: usize },
    /// Content remained after the payload was fully read.
    TrailingBytes { extra: usize },
    /// Negotiation content began with an unknown message tag.
    UnknownNegotiationKind { kind: u8 },
    OpModeOutOfRange { value: u8 },
}

/// Decode a reassembled message into a payload value.
///
/// Subtypes the frame layer recognises but the device does not act on
/// produce no value; they are logged and the caller discards them.
pub fn decode(message: &Message) -> Result<Option<Payload>, PayloadError> {
    let content = &message.content[..];
    let body = match message.kind {
        FrameKind::Control(subtype) => match subtype {
            ControlSubtype::Ack => Some(PayloadBody::Ack {
                request_sequence: single_byte(content)?,
            }),
            ControlSubtype::SetSecurityMode => Some(PayloadBody::SecurityMode {
                checksum_enabled: single_byte(content)? != 0,
            }),
            ControlSubtype::SetWifiOpMode => Some(PayloadBody::WifiOpMode(WifiOpMode::try_from(
                single_byte(content)?,
            )?)),
            ControlSubtype::ConnectAp => Some(PayloadBody::ConnectAp),
            ControlSubtype::GetWifiList => Some(PayloadBody::GetWifiList),
            other => {
                log::warn!("unsupported control subtype: {:?}", other);
                None
            }
        },
        FrameKind::Data(subtype) => match subtype {
            DataSubtype::Negotiation => Some(decode_negotiation(content)?),
            DataSubtype::Ssid => Some(PayloadBody::Ssid(
                String::from_utf8_lossy(content).into_owned(),
            )),
            DataSubtype::Password => Some(PayloadBody::Password(
                String::from_utf8_lossy(content).into_owned(),
            )),
            DataSubtype::CustomData => Some(PayloadBody::CustomData(content.to_vec())),
            other => {
                log::warn!("unsupported data subtype: {:?}", other);
                None
            }
        },
    };

    Ok(body.map(|body| Payload {
        frame_control: message.frame_control,
        body,
    }))
}

fn single_byte(content: &[u8]) -> Result<u8, PayloadError> {
    match content {
        [byte] => Ok(*byte),
        _ => Err(PayloadError::WrongSize {
            have: content.len(),
            need: 1,
        }),
    }
}

fn decode_negotiation(content: &[u8]) -> Result<PayloadBody, PayloadError> {
    let Some((&kind, rem)) = content.split_first() else {
        return Err(PayloadError::Truncated { have: 0, need: 1 });
    };

    match kind {
        0 => {
            let (pkg_len, rem) = read_be16(rem)?;
            if !rem.is_empty() {
                return Err(PayloadError::TrailingBytes { extra: rem.len() });
            }
            Ok(PayloadBody::Negotiation0 { pkg_len })
        }
        1 => {
            let (prime, rem) = read_blob(rem)?;
            let (generator, rem) = read_blob(rem)?;
            let (pubkey, rem) = read_blob(rem)?;
            if !rem.is_empty() {
                return Err(PayloadError::TrailingBytes { extra: rem.len() });
            }
            Ok(PayloadBody::Negotiation1(NegotiationParams {
                prime,
                generator,
                pubkey,
            }))
        }
        kind => Err(PayloadError::UnknownNegotiationKind { kind }),
    }
}

fn read_be16(rem: &[u8]) -> Result<(u16, &[u8]), PayloadError> {
    if rem.len() < 2 {
        return Err(PayloadError::Truncated {
            have: rem.len(),
            need: 2,
        });
    }
    Ok((u16::from_be_bytes([rem[0], rem[1]]), &rem[2..]))
}

fn read_blob(rem: &[u8]) -> Result<(Vec<u8>, &[u8]), PayloadError> {
    let (len, rem) = read_be16(rem)?;
    let len = usize::from(len);
    if rem.len() < len {
        return Err(PayloadError::Truncated {
            have: rem.len(),
            need: len,
        });
    }
    Ok((rem[..len].to_vec(), &rem[len..]))
}

/// One access point in a scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApRecord {
    pub ssid: String,
    pub rssi: i8,
}

/// Longest SSID a scan entry may carry (the 802.11 limit).
pub const MAX_SSID_LEN: usize = 32;

// Clients misbehave on an empty list, so every scan response leads with a
// placeholder entry they can always render.
const NOT_EXIST_AP: &str = "not exist ap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiListError {
    SsidTooLong { len: usize },
}

/// Serialise a scan result: per access point one length byte
/// (`len(ssid) + 1`), one signed RSSI byte, then the raw SSID bytes.
/// The sentinel entry (RSSI byte 0xFF) always comes first.
pub fn encode_wifi_list(aps: &[ApRecord]) -> Result<Vec<u8>, WifiListError> {
    let len: usize = (2 + NOT_EXIST_AP.len())
        + aps.iter().map(|ap| 2 + ap.ssid.len()).sum::<usize>();
    let mut buf = Vec::with_capacity(len);

    push_ap_entry(&mut buf, NOT_EXIST_AP.as_bytes(), u8::MAX);
    for ap in aps {
        let ssid = ap.ssid.as_bytes();
        if ssid.len() > MAX_SSID_LEN {
            return Err(WifiListError::SsidTooLong { len: ssid.len() });
        }
        push_ap_entry(&mut buf, ssid, ap.rssi as u8);
    }
    Ok(buf)
}

fn push_ap_entry(buf: &mut Vec<u8>, ssid: &[u8], rssi: u8) {
    buf.push(ssid.len() as u8 + 1);
    buf.push(rssi);
    buf.extend_from_slice(ssid);
}
