//! The provisioning dialogue driven over one connection.
//!
//! A [`Provisioner`] plays the device side of the exchange: negotiation,
//! security-mode and operating-mode configuration, SSID and password
//! delivery, scan requests and finally the connect order. It owns the
//! session for the single connected peer plus the payload values the
//! dialogue accumulates, and it talks to the rest of the firmware through
//! the [`Platform`] trait.
//!
//! Entry points map one-to-one onto transport and collaborator callbacks
//! (connect, subscribe, MTU change, write, disconnect, scan completion,
//! command reply). The embedder serialises them, typically with one mutex
//! held for the duration of each callback, so the provisioner itself is a
//! plain single-owner value.

use alloc::string::String;
use alloc::vec::Vec;

use rand_core::RngCore;

use crate::payload::{
    ApRecord, NegotiationParams, Payload, PayloadBody, PayloadError, WifiOpMode,
};
use crate::session::{FrameWriter, Progress, Session, SessionError};

/// Everything the provisioning dialogue needs from the surrounding
/// firmware: the Wi-Fi driver, the device-token store and the application
/// command dispatcher.
pub trait Platform {
    /// Kick off an asynchronous scan; results come back through
    /// [`Provisioner::on_scan_complete`].
    fn start_wifi_scan(&mut self) -> Result<(), PlatformError>;

    fn set_wifi_credentials(&mut self, ssid: &str, password: &str) -> Result<(), PlatformError>;

    fn reconnect_wifi(&mut self) -> Result<(), PlatformError>;

    /// Once a device token is held, credential updates are refused and a
    /// connect request is answered with a status report instead.
    fn has_device_token(&self) -> bool;

    /// Run an application command carried as custom data. A reply returned
    /// here is posted immediately; a deferred reply re-enters through
    /// [`Provisioner::on_command_reply`].
    fn execute_command(&mut self, command: &[u8]) -> Result<Option<Vec<u8>>, PlatformError>;

    /// The device status payload posted when provisioning is refused.
    fn status_report(&mut self) -> Result<Vec<u8>, PlatformError>;
}

/// Non-zero status from a collaborator, carried through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError {
    pub code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    /// No session: the peer is not connected (or already gone).
    NotConnected,
    /// A second peer tried to connect; the protocol is single-peer.
    AlreadyConnected,
    /// The payload requires a completed negotiation.
    NotNegotiated,
    /// The peer restarted negotiation mid-session.
    NegotiationRepeated,
    /// The peer asked for the checksum-less security mode, which the
    /// device refuses.
    ChecksumDisabled,
    /// The peer asked for an operating mode other than station.
    UnsupportedOpMode { mode: WifiOpMode },
    /// Connect ordered before both SSID and password arrived.
    MissingCredentials,
    Session(SessionError),
    Payload(PayloadError),
    Platform(PlatformError),
}

impl From<SessionError> for HandlerError {
    fn from(other: SessionError) -> Self {
        HandlerError::Session(other)
    }
}

impl From<PayloadError> for HandlerError {
    fn from(other: PayloadError) -> Self {
        HandlerError::Payload(other)
    }
}

impl From<PlatformError> for HandlerError {
    fn from(other: PlatformError) -> Self {
        HandlerError::Platform(other)
    }
}

pub struct Provisioner<W, P> {
    session: Option<Session<W>>,
    conn_handle: u16,
    attr_handle: u16,
    platform: P,

    // Payload values the dialogue accumulates; all dropped on disconnect.
    negotiation0: Option<u16>,
    negotiation1: Option<NegotiationParams>,
    security_mode: Option<bool>,
    op_mode: Option<WifiOpMode>,
    ssid: Option<String>,
    password: Option<String>,
}

impl<W: FrameWriter, P: Platform> Provisioner<W, P> {
    pub fn new(platform: P) -> Self {
        Self {
            session: None,
            conn_handle: 0,
            attr_handle: 0,
            platform,
            negotiation0: None,
            negotiation1: None,
            security_mode: None,
            op_mode: None,
            ssid: None,
            password: None,
        }
    }

    pub fn connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session<W>> {
        self.session.as_ref()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// The peer's announced negotiation package length, once seen.
    pub fn negotiation_package_len(&self) -> Option<u16> {
        self.negotiation0
    }

    /// The checksum setting the peer configured, once seen.
    pub fn security_mode(&self) -> Option<bool> {
        self.security_mode
    }

    /// The operating mode the peer configured, once seen.
    pub fn op_mode(&self) -> Option<WifiOpMode> {
        self.op_mode
    }

    /// A peer connected: create the session and reset the dialogue.
    pub fn on_connect(&mut self, writer: W, conn_handle: u16) -> Result<(), HandlerError> {
        if self.session.is_some() {
            return Err(HandlerError::AlreadyConnected);
        }
        log::info!("provisioning session connected");
        self.session = Some(Session::new(writer));
        self.conn_handle = conn_handle;
        self.clear_slots();
        Ok(())
    }

    /// The peer subscribed to the notify characteristic.
    pub fn on_subscribe(&mut self, attr_handle: u16) {
        self.attr_handle = attr_handle;
    }

    /// The link MTU changed; expected once, before the first exchange.
    pub fn on_mtu_update(&mut self, mtu: u8) -> Result<(), HandlerError> {
        self.session
            .as_mut()
            .ok_or(HandlerError::NotConnected)?
            .set_mtu(mtu)?;
        Ok(())
    }

    /// The peer disconnected: release the session (and with it the
    /// decoder's in-flight frames) and every pending payload value.
    pub fn on_disconnect(&mut self) {
        log::info!("provisioning session disconnected");
        self.session = None;
        self.clear_slots();
    }

    /// One inbound attribute write: frame in, state machine forward.
    pub fn on_write(&mut self, buffer: &[u8], rng: &mut impl RngCore) -> Result<(), HandlerError> {
        let payload = {
            let session = self.session.as_mut().ok_or(HandlerError::NotConnected)?;
            match session.update(buffer)? {
                Progress::NeedMoreFrames => return Ok(()),
                Progress::ReadyToDecode => session.decode()?,
            }
        };

        match payload {
            Some(payload) => self.dispatch(payload, rng),
            // Recognised but unsupported; already logged, nothing to do.
            None => Ok(()),
        }
    }

    /// Scan results arrived from the Wi-Fi collaborator. A scan finishing
    /// after disconnect finds no session and changes nothing.
    pub fn on_scan_complete(&mut self, aps: &[ApRecord]) -> Result<(), HandlerError> {
        let (conn_handle, attr_handle) = (self.conn_handle, self.attr_handle);
        let Some(session) = self.session.as_mut() else {
            log::info!("session already closed; dropping scan results");
            return Err(HandlerError::NotConnected);
        };
        session.post_wifi_list(conn_handle, attr_handle, aps)?;
        Ok(())
    }

    /// A deferred command reply arrived from the application dispatcher.
    pub fn on_command_reply(&mut self, reply: &[u8]) -> Result<(), HandlerError> {
        let (conn_handle, attr_handle) = (self.conn_handle, self.attr_handle);
        let Some(session) = self.session.as_mut() else {
            log::info!("session already closed; dropping command reply");
            return Err(HandlerError::NotConnected);
        };
        session.post_custom_data(conn_handle, attr_handle, reply)?;
        Ok(())
    }

    fn dispatch(&mut self, payload: Payload, rng: &mut impl RngCore) -> Result<(), HandlerError> {
        let (conn_handle, attr_handle) = (self.conn_handle, self.attr_handle);

        match payload.body {
            // The peer acknowledged one of our frames; nothing tracks acks.
            PayloadBody::Ack { .. } => Ok(()),

            PayloadBody::Negotiation0 { pkg_len } => {
                self.negotiation0 = Some(pkg_len);
                Ok(())
            }

            PayloadBody::Negotiation1(params) => {
                if self.negotiation1.is_some() {
                    return Err(HandlerError::NegotiationRepeated);
                }
                let session = self.session.as_mut().ok_or(HandlerError::NotConnected)?;
                let public_key = session.establish_keys(rng)?;
                session.complete_negotiation(&params.pubkey)?;
                session.post_negotiation(conn_handle, attr_handle, &public_key)?;
                self.negotiation1 = Some(params);
                Ok(())
            }

            PayloadBody::SecurityMode { checksum_enabled } => {
                self.require_negotiated()?;
                self.security_mode = Some(checksum_enabled);
                if !checksum_enabled {
                    return Err(HandlerError::ChecksumDisabled);
                }
                Ok(())
            }

            PayloadBody::WifiOpMode(mode) => {
                self.require_negotiated()?;
                self.op_mode = Some(mode);
                // The ack goes out regardless of whether the mode itself is
                // acceptable; station-only enforcement comes after.
                if payload.frame_control.ack_requested() {
                    self.session
                        .as_mut()
                        .ok_or(HandlerError::NotConnected)?
                        .post_ack(conn_handle, attr_handle)?;
                }
                if mode != WifiOpMode::Sta {
                    return Err(HandlerError::UnsupportedOpMode { mode });
                }
                Ok(())
            }

            PayloadBody::CustomData(command) => {
                self.require_negotiated()?;
                if let Some(reply) = self.platform.execute_command(&command)? {
                    self.session
                        .as_mut()
                        .ok_or(HandlerError::NotConnected)?
                        .post_custom_data(conn_handle, attr_handle, &reply)?;
                }
                Ok(())
            }

            PayloadBody::GetWifiList => {
                self.require_negotiated()?;
                self.platform.start_wifi_scan()?;
                Ok(())
            }

            PayloadBody::Ssid(ssid) => {
                self.require_negotiated()?;
                if self.platform.has_device_token() {
                    // The connect request will be answered with a status
                    // report instead.
                    log::info!("device token already held; ignoring ssid");
                    return Ok(());
                }
                self.ssid = Some(ssid);
                Ok(())
            }

            PayloadBody::Password(password) => {
                self.require_negotiated()?;
                if self.platform.has_device_token() {
                    log::info!("device token already held; ignoring password");
                    return Ok(());
                }
                self.password = Some(password);
                Ok(())
            }

            PayloadBody::ConnectAp => self.handle_connect_ap(),
        }
    }

    fn handle_connect_ap(&mut self) -> Result<(), HandlerError> {
        self.require_negotiated()?;
        log::info!("peer requested wifi connect");

        if self.platform.has_device_token() {
            let status = self.platform.status_report()?;
            let (conn_handle, attr_handle) = (self.conn_handle, self.attr_handle);
            self.session
                .as_mut()
                .ok_or(HandlerError::NotConnected)?
                .post_custom_data(conn_handle, attr_handle, &status)?;
            return Ok(());
        }

        let ssid = self.ssid.as_deref().ok_or(HandlerError::MissingCredentials)?;
        let password = self
            .password
            .as_deref()
            .ok_or(HandlerError::MissingCredentials)?;
        self.platform.set_wifi_credentials(ssid, password)?;
        self.platform.reconnect_wifi()?;
        Ok(())
    }

    fn require_negotiated(&self) -> Result<(), HandlerError> {
        match &self.session {
            Some(session) if session.negotiated() => Ok(()),
            Some(_) => Err(HandlerError::NotNegotiated),
            None => Err(HandlerError::NotConnected),
        }
    }

    fn clear_slots(&mut self) {
        self.negotiation0 = None;
        self.negotiation1 = None;
        self.security_mode = None;
        self.op_mode = None;
        self.ssid = None;
        self.password = None;
    }
}
