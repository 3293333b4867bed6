//! Device-side implementation of the BluFi Wi-Fi provisioning protocol.
//!
//! BluFi carries Wi-Fi credentials from a phone application to an embedded
//! device over a GATT-style attribute link: small MTUs, one write
//! characteristic inbound and one notify characteristic outbound, a single
//! connected peer. This crate implements the transport-independent core of
//! the device side:
//!
//!  - the bit-exact frame codec ([`frame`])
//!  - reassembly of fragmented messages ([`decoder`]) and the matching
//!    outbound fragmentation ([`encoder`])
//!  - the typed payload codec ([`payload`])
//!  - the Diffie-Hellman negotiation, CCITT checksum and AES-CFB128 payload
//!    encryption ([`crypto`])
//!  - the sequence-numbered per-connection session ([`session`])
//!  - the provisioning state machine that sequences negotiation, credential
//!    exchange and connect ([`handler`])
//!
//! The attribute transport, the Wi-Fi driver and the application command
//! dispatcher stay outside; they are consumed through the
//! [`session::FrameWriter`] and [`handler::Platform`] seams.
//!
//! Supports `no_std` (requires `alloc`).
//!
//! # Security
//!
//! The key exchange is unauthenticated finite-field Diffie-Hellman and the
//! AES key is the MD5 digest of the shared secret. Both are prescribed by
//! the protocol and preserved for interoperability: an on-path attacker can
//! substitute public keys during negotiation.
#![no_std]

extern crate alloc;

pub mod crypto;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod handler;
pub mod payload;
pub mod session;

pub use decoder::{DecoderState, FragmentDecoder, Message};
pub use frame::{ControlSubtype, DataSubtype, Direction, Frame, FrameControl, FrameKind};
pub use handler::{HandlerError, Platform, PlatformError, Provisioner};
pub use payload::{ApRecord, NegotiationParams, Payload, PayloadBody, WifiOpMode};
pub use session::{FrameWriter, Progress, Session, SessionError, WriterError, DEFAULT_MTU};
