//! The on-wire frame unit and its bit-exact codec.
//!
//! Every attribute write or notification carries exactly one frame:
//!
//! ```norust
//!  1               | 1             | 1               | 1           | 0 or 2               | N    | 0 or 2
//! type|subtype<<2  | frame_control | sequence_number | data_length | total_content_length | data | check_sum
//! ```
//!
//! `total_content_length` is present iff the fragment flag is set,
//! `check_sum` iff the checksum flag is set; both are little-endian.
//! `data_length` covers the data region *including* the optional two-byte
//! `total_content_length` prefix, so `N = data_length - 2` on fragmented
//! frames.

use alloc::vec::Vec;
use modular_bitfield::prelude::*;

/// The frame-control flag byte.
///
/// The upper three bits are reserved and must be zero on the wire.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub encrypted: bool,
    pub checksummed: bool,
    #[bits = 1]
    pub direction: Direction,
    pub ack_requested: bool,
    pub fragmented: bool,
    pub rfu: B3,
}

impl FrameControl {
    /// The flags a caller may supply to the encoder and the flags a
    /// reassembled payload retains: everything except the fragment bit,
    /// which belongs to the fragmentation layer.
    pub fn masked(self) -> FrameControl {
        FrameControl::new()
            .with_encrypted(self.encrypted())
            .with_checksummed(self.checksummed())
            .with_direction(self.direction())
            .with_ack_requested(self.ack_requested())
    }
}

/// Who a frame is travelling towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
pub enum Direction {
    /// App (phone) to device; the only direction the device accepts.
    ToDevice = 0,
    /// Device to app, sent as a notification.
    ToApp = 1,
}

/// Control-frame subtypes (frame type bit = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlSubtype {
    Ack = 0x00,
    SetSecurityMode = 0x01,
    SetWifiOpMode = 0x02,
    ConnectAp = 0x03,
    DisconnectAp = 0x04,
    GetWifiStatus = 0x05,
    DisconnectStaFromSoftAp = 0x06,
    GetVersion = 0x07,
    DisconnectGattLink = 0x08,
    GetWifiList = 0x09,
}

impl TryFrom<u8> for ControlSubtype {
    type Error = UnknownSubtype;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ControlSubtype::*;
        Ok(match value {
            0x00 => Ack,
            0x01 => SetSecurityMode,
            0x02 => SetWifiOpMode,
            0x03 => ConnectAp,
            0x04 => DisconnectAp,
            0x05 => GetWifiStatus,
            0x06 => DisconnectStaFromSoftAp,
            0x07 => GetVersion,
            0x08 => DisconnectGattLink,
            0x09 => GetWifiList,
            _ => return Err(UnknownSubtype { subtype: value }),
        })
    }
}

/// Data-frame subtypes (frame type bit = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataSubtype {
    Negotiation = 0x00,
    BssidForSta = 0x01,
    Ssid = 0x02,
    Password = 0x03,
    SoftApSsid = 0x04,
    SoftApPassword = 0x05,
    SoftApMaxConnections = 0x06,
    SoftApAuthMode = 0x07,
    SoftApChannel = 0x08,
    Username = 0x09,
    CaCertificate = 0x0A,
    ClientCertificate = 0x0B,
    ServerCertificate = 0x0C,
    ClientPrivateKey = 0x0D,
    ServerPrivateKey = 0x0E,
    WifiConnectionStateReport = 0x0F,
    Version = 0x10,
    WifiList = 0x11,
    ReportError = 0x12,
    CustomData = 0x13,
}

impl TryFrom<u8> for DataSubtype {
    type Error = UnknownSubtype;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use DataSubtype::*;
        Ok(match value {
            0x00 => Negotiation,
            0x01 => BssidForSta,
            0x02 => Ssid,
            0x03 => Password,
            0x04 => SoftApSsid,
            0x05 => SoftApPassword,
            0x06 => SoftApMaxConnections,
            0x07 => SoftApAuthMode,
            0x08 => SoftApChannel,
            0x09 => Username,
            0x0A => CaCertificate,
            0x0B => ClientCertificate,
            0x0C => ServerCertificate,
            0x0D => ClientPrivateKey,
            0x0E => ServerPrivateKey,
            0x0F => WifiConnectionStateReport,
            0x10 => Version,
            0x11 => WifiList,
            0x12 => ReportError,
            0x13 => CustomData,
            _ => return Err(UnknownSubtype { subtype: value }),
        })
    }
}

/// A subtype value outside the set defined for its frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSubtype {
    pub subtype: u8,
}

/// Frame type and subtype, packed into the first wire byte as
/// `type | subtype << 2`. Bit 1 is unused and transmitted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Control(ControlSubtype),
    Data(DataSubtype),
}

impl FrameKind {
    pub fn from_wire(byte: u8) -> Result<Self, UnknownSubtype> {
        let subtype = byte >> 2;
        if byte & 0x01 == 0 {
            Ok(FrameKind::Control(ControlSubtype::try_from(subtype)?))
        } else {
            Ok(FrameKind::Data(DataSubtype::try_from(subtype)?))
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            FrameKind::Control(subtype) => (subtype as u8) << 2,
            FrameKind::Data(subtype) => 0x01 | ((subtype as u8) << 2),
        }
    }

    /// Whether `self` and `other` share the frame type bit (not necessarily
    /// the subtype).
    pub fn same_type(self, other: FrameKind) -> bool {
        matches!(
            (self, other),
            (FrameKind::Control(_), FrameKind::Control(_)) | (FrameKind::Data(_), FrameKind::Data(_))
        )
    }
}

/// One decoded frame. `data` is the payload region without the
/// `total_content_length` prefix; `data_length` is the wire value and still
/// counts the prefix on fragmented frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub frame_control: FrameControl,
    pub sequence_number: u8,
    pub data_length: u8,
    pub total_content_length: u16,
    pub data: Vec<u8>,
    pub check_sum: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer ran out before the field at hand was complete. `need` is the
    /// total length the buffer would have required so far.
    SmallerThanMinSize { have: usize, need: usize },
    /// Decode consumed everything it was owed but bytes remain.
    TrailingBytes { extra: usize },
    /// Reserved frame-control bits were set.
    ReservedFlagBits { frame_control: u8 },
    /// Fragment flag set with a zero total content length.
    MissingTotalContentLength,
    /// Total content length present without the fragment flag.
    UnexpectedTotalContentLength { total_content_length: u16 },
    /// Fragmented frame too short to hold the total-content-length prefix.
    FragmentTooShort { data_length: u8 },
    /// `data_length` disagrees with the actual payload region.
    DataLengthMismatch { declared: u8, actual: usize },
    Subtype(UnknownSubtype),
}

impl From<UnknownSubtype> for FrameError {
    fn from(other: UnknownSubtype) -> Self {
        FrameError::Subtype(other)
    }
}

impl Frame {
    /// Check the structural invariants that hold for every valid frame,
    /// encoded or decoded.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.frame_control.rfu() != 0 {
            return Err(FrameError::ReservedFlagBits {
                frame_control: self.frame_control.into_bytes()[0],
            });
        }

        let prefix_len: u8 = if self.frame_control.fragmented() {
            if self.total_content_length == 0 {
                return Err(FrameError::MissingTotalContentLength);
            }
            if self.data_length < 2 {
                return Err(FrameError::FragmentTooShort {
                    data_length: self.data_length,
                });
            }
            2
        } else {
            if self.total_content_length > 0 {
                return Err(FrameError::UnexpectedTotalContentLength {
                    total_content_length: self.total_content_length,
                });
            }
            0
        };

        let expected = usize::from(self.data_length - prefix_len);
        if self.data.len() != expected {
            return Err(FrameError::DataLengthMismatch {
                declared: self.data_length,
                actual: self.data.len(),
            });
        }

        Ok(())
    }

    /// Serialise to the wire layout. Fails if [`Frame::validate`] does.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        self.validate()?;

        let fragmented = self.frame_control.fragmented();
        let checksummed = self.frame_control.checksummed();
        let len = 4 + usize::from(self.data_length) + if checksummed { 2 } else { 0 };

        let mut out = Vec::with_capacity(len);
        out.push(self.kind.to_wire());
        out.push(self.frame_control.into_bytes()[0]);
        out.push(self.sequence_number);
        out.push(self.data_length);
        if fragmented {
            out.extend_from_slice(&self.total_content_length.to_le_bytes());
        }
        out.extend_from_slice(&self.data);
        if checksummed {
            out.extend_from_slice(&self.check_sum.to_le_bytes());
        }
        Ok(out)
    }

    /// Parse one frame, requiring the buffer to be consumed exactly.
    pub fn decode(buffer: &[u8]) -> Result<Self, FrameError> {
        let have = buffer.len();
        if have < 4 {
            return Err(FrameError::SmallerThanMinSize { have, need: 4 });
        }

        let kind = FrameKind::from_wire(buffer[0])?;
        let frame_control = FrameControl::from_bytes([buffer[1]]);
        let sequence_number = buffer[2];
        let data_length = buffer[3];
        let mut need = 4;
        let mut rem = &buffer[4..];

        let mut total_content_length = 0u16;
        if frame_control.fragmented() {
            need += 2;
            if have < need {
                return Err(FrameError::SmallerThanMinSize { have, need });
            }
            total_content_length = u16::from_le_bytes([rem[0], rem[1]]);
            rem = &rem[2..];
        }

        let body_len = usize::from(data_length)
            .checked_sub(if frame_control.fragmented() { 2 } else { 0 })
            .ok_or(FrameError::FragmentTooShort { data_length })?;
        need += body_len;
        if have < need {
            return Err(FrameError::SmallerThanMinSize { have, need });
        }
        let data = rem[..body_len].to_vec();
        rem = &rem[body_len..];

        let mut check_sum = 0u16;
        if frame_control.checksummed() {
            need += 2;
            if have < need {
                return Err(FrameError::SmallerThanMinSize { have, need });
            }
            check_sum = u16::from_le_bytes([rem[0], rem[1]]);
            rem = &rem[2..];
        }

        if !rem.is_empty() {
            return Err(FrameError::TrailingBytes { extra: rem.len() });
        }

        let frame = Frame {
            kind,
            frame_control,
            sequence_number,
            data_length,
            total_content_length,
            data,
            check_sum,
        };
        frame.validate()?;
        Ok(frame)
    }
}
