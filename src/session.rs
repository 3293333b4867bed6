//! The per-connection protocol session.
//!
//! A session lives from peer connect to disconnect. It owns the two
//! direction-local sequence counters, the negotiation keys, the fragment
//! decoder for the inbound stream and the writer that carries outbound
//! frames back to the transport. Inbound bytes enter through
//! [`Session::update`]; outbound messages leave through the `post_*`
//! operations, which fragment, number and write them.

use rand_core::RngCore;

use crate::crypto::{self, CryptoError, DH_KEY_LEN};
use crate::decoder::{DecoderState, FragmentDecoder};
use crate::encoder::{self, EncodeError};
use crate::frame::{
    ControlSubtype, DataSubtype, Direction, Frame, FrameControl, FrameError, FrameKind,
};
use crate::payload::{self, ApRecord, Payload, PayloadError, WifiListError};

/// Effective MTU a fresh session assumes, matching the Bluedroid stack's
/// value.
pub const DEFAULT_MTU: u8 = 125;

/// Smallest MTU that still fits a fragment's payload.
pub const MIN_MTU: u8 = 12;

/// The transport seam: transmits one encoded frame as an attribute
/// notification.
///
/// Invoked while the embedder's session lock is held; implementations must
/// not block, and a failure aborts the post that issued it.
pub trait FrameWriter {
    fn write_frame(
        &mut self,
        conn_handle: u16,
        attr_handle: u16,
        frame: &Frame,
    ) -> Result<(), WriterError>;
}

/// Non-zero status from the transport, carried through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterError {
    pub code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Frame(FrameError),
    /// The inbound frame does not carry the expected next sequence number.
    SequenceSkipped { expected: u8, got: u8 },
    /// An inbound frame claimed the device-to-app direction.
    InvalidDirection,
    /// The fragment decoder entered the given terminal error state.
    Reassembly(DecoderState),
    /// An encrypted-tier post was attempted before negotiation completed.
    NotNegotiated,
    Encode(EncodeError),
    WifiList(WifiListError),
    Writer(WriterError),
    Crypto(CryptoError),
}

impl From<FrameError> for SessionError {
    fn from(other: FrameError) -> Self {
        SessionError::Frame(other)
    }
}

impl From<EncodeError> for SessionError {
    fn from(other: EncodeError) -> Self {
        SessionError::Encode(other)
    }
}

impl From<WifiListError> for SessionError {
    fn from(other: WifiListError) -> Self {
        SessionError::WifiList(other)
    }
}

impl From<CryptoError> for SessionError {
    fn from(other: CryptoError) -> Self {
        SessionError::Crypto(other)
    }
}

/// Outcome of feeding one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The frame joined a message that is still incomplete.
    NeedMoreFrames,
    /// A message completed; [`Session::decode`] will yield it.
    ReadyToDecode,
}

pub struct Session<W> {
    mtu: u8,
    app_sequence_number: u8,
    device_sequence_number: u8,
    private_key: [u8; DH_KEY_LEN],
    public_key: [u8; DH_KEY_LEN],
    secret_key: [u8; DH_KEY_LEN],
    negotiated: bool,
    frame_data_decoder: Option<FragmentDecoder>,
    writer: W,
}

impl<W: FrameWriter> Session<W> {
    /// A fresh session: zeroed keys and counters, [`DEFAULT_MTU`].
    pub fn new(writer: W) -> Self {
        Self {
            mtu: DEFAULT_MTU,
            app_sequence_number: 0,
            device_sequence_number: 0,
            private_key: [0; DH_KEY_LEN],
            public_key: [0; DH_KEY_LEN],
            secret_key: [0; DH_KEY_LEN],
            negotiated: false,
            frame_data_decoder: None,
            writer,
        }
    }

    pub fn mtu(&self) -> u8 {
        self.mtu
    }

    /// Adjust the effective MTU; meant to happen before the first exchange.
    pub fn set_mtu(&mut self, mtu: u8) -> Result<(), SessionError> {
        if mtu < MIN_MTU {
            return Err(SessionError::Encode(EncodeError::MtuTooSmall { mtu }));
        }
        self.mtu = mtu;
        Ok(())
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    pub fn public_key(&self) -> &[u8; DH_KEY_LEN] {
        &self.public_key
    }

    /// Consume one inbound attribute write.
    ///
    /// Decodes the frame, decrypts its payload if it is marked encrypted
    /// and negotiation has completed, enforces the sequence number and
    /// direction, and feeds the fragment decoder. The inbound counter
    /// advances only on the two Ok outcomes; on any error it stays put and
    /// the decoder keeps whatever state it reached.
    pub fn update(&mut self, buffer: &[u8]) -> Result<Progress, SessionError> {
        let mut frame = Frame::decode(buffer)?;

        if frame.frame_control.encrypted() && self.negotiated {
            let key = crypto::derive_session_key(&self.secret_key);
            let iv = crypto::frame_iv(frame.sequence_number);
            crypto::decrypt_in_place(&key, &iv, &mut frame.data);
        }

        if frame.sequence_number != self.app_sequence_number {
            return Err(SessionError::SequenceSkipped {
                expected: self.app_sequence_number,
                got: frame.sequence_number,
            });
        }

        if frame.frame_control.direction() != Direction::ToDevice {
            return Err(SessionError::InvalidDirection);
        }

        let decoder = self
            .frame_data_decoder
            .get_or_insert_with(FragmentDecoder::new);

        match decoder.update(frame) {
            DecoderState::NeedMoreFrames => {
                self.app_sequence_number = self.app_sequence_number.wrapping_add(1);
                Ok(Progress::NeedMoreFrames)
            }
            DecoderState::ReadyToDecode => {
                self.app_sequence_number = self.app_sequence_number.wrapping_add(1);
                Ok(Progress::ReadyToDecode)
            }
            state => Err(SessionError::Reassembly(state)),
        }
    }

    /// Decode the completed message, if one is pending.
    pub fn decode(&mut self) -> Result<Option<Payload>, PayloadError> {
        let Some(decoder) = self.frame_data_decoder.as_mut() else {
            return Ok(None);
        };
        match decoder.drain() {
            Some(message) => payload::decode(&message),
            None => Ok(None),
        }
    }

    /// Generate the session's Diffie-Hellman key pair, returning the public
    /// key to be posted to the peer.
    pub fn establish_keys(&mut self, rng: &mut impl RngCore) -> Result<[u8; DH_KEY_LEN], SessionError> {
        let pair = crypto::generate_key_pair(crypto::DH_PRIME_HEX, crypto::DH_GENERATOR, rng)?;
        self.private_key = pair.private_key;
        self.public_key = pair.public_key;
        Ok(self.public_key)
    }

    /// Fix the shared secret from the peer's public key.
    pub fn complete_negotiation(&mut self, peer_public_key: &[u8]) -> Result<(), SessionError> {
        self.secret_key =
            crypto::shared_secret(crypto::DH_PRIME_HEX, &self.private_key, peer_public_key)?;
        Ok(())
    }

    /// Acknowledge the most recently accepted inbound frame.
    pub fn post_ack(&mut self, conn_handle: u16, attr_handle: u16) -> Result<(), SessionError> {
        let data = [self.app_sequence_number.wrapping_sub(1)];
        let frame_list = encoder::fragment(
            FrameKind::Control(ControlSubtype::Ack),
            outbound_frame_control(),
            self.device_sequence_number,
            &data,
            self.mtu,
        )?;
        self.write_frames(conn_handle, attr_handle, &frame_list)
    }

    /// Post the device's raw public key as the negotiation response. On
    /// success the session counts as negotiated: inbound frames marked
    /// encrypted will be decrypted from here on.
    pub fn post_negotiation(
        &mut self,
        conn_handle: u16,
        attr_handle: u16,
        public_key: &[u8],
    ) -> Result<(), SessionError> {
        let frame_list = encoder::fragment(
            FrameKind::Data(DataSubtype::Negotiation),
            outbound_frame_control(),
            self.device_sequence_number,
            public_key,
            self.mtu,
        )?;
        self.write_frames(conn_handle, attr_handle, &frame_list)?;
        self.negotiated = true;
        Ok(())
    }

    /// Post application bytes as a custom-data message.
    pub fn post_custom_data(
        &mut self,
        conn_handle: u16,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), SessionError> {
        if !self.negotiated {
            return Err(SessionError::NotNegotiated);
        }
        let frame_list = encoder::fragment(
            FrameKind::Data(DataSubtype::CustomData),
            outbound_frame_control(),
            self.device_sequence_number,
            data,
            self.mtu,
        )?;
        self.write_frames(conn_handle, attr_handle, &frame_list)
    }

    /// Post a scan result as a Wi-Fi list message.
    pub fn post_wifi_list(
        &mut self,
        conn_handle: u16,
        attr_handle: u16,
        aps: &[ApRecord],
    ) -> Result<(), SessionError> {
        if !self.negotiated {
            return Err(SessionError::NotNegotiated);
        }
        let buf = payload::encode_wifi_list(aps)?;
        let frame_list = encoder::fragment(
            FrameKind::Data(DataSubtype::WifiList),
            outbound_frame_control(),
            self.device_sequence_number,
            &buf,
            self.mtu,
        )?;
        self.write_frames(conn_handle, attr_handle, &frame_list)
    }

    fn write_frames(
        &mut self,
        conn_handle: u16,
        attr_handle: u16,
        frame_list: &[Frame],
    ) -> Result<(), SessionError> {
        for frame in frame_list {
            if let Err(err) = self.writer.write_frame(conn_handle, attr_handle, frame) {
                log::warn!("frame writer failed: {}", err.code);
                return Err(SessionError::Writer(err));
            }
            self.device_sequence_number = self.device_sequence_number.wrapping_add(1);
        }
        Ok(())
    }
}

fn outbound_frame_control() -> FrameControl {
    FrameControl::new().with_direction(Direction::ToApp)
}
