//! Command framing, typed command builders and reply decoding
//!
//! Every frame is an 8-byte header followed by at most 56 bytes of payload:
//!
//! ```text
//! [cmd, direction|flags, transport, subcmd, reserved, payload_len, reserved, reserved, payload..]
//! ```

use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{ProtocolError, Result, TransportError};
use crate::protocol::{cmd, direction, flash, link, payload, subcmd, HEADER_SIZE, MAX_PAYLOAD};
use crate::types::{DspVersion, VersionInfo};

// =============================================================================
// Frame Header
// =============================================================================

/// Command/reply header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CommandHeader {
    pub command: u8,
    /// Direction with acknowledgement flags in the low bits
    pub direction: u8,
    pub transport: u8,
    pub subcommand: u8,
    _reserved0: u8,
    /// Payload length
    pub length: u8,
    _reserved1: [u8; 2],
}

impl CommandHeader {
    /// Header for a host-to-controller command over USB
    pub fn outbound(command: u8, subcommand: u8, length: u8) -> Self {
        Self {
            command,
            direction: direction::OUT | direction::FLAG_OK,
            transport: link::USB,
            subcommand,
            _reserved0: 0,
            length,
            _reserved1: [0; 2],
        }
    }

    /// Read the header at the start of an inbound frame
    pub fn parse(frame: &[u8]) -> Result<Self> {
        Self::read_from_prefix(frame)
            .map(|(header, _)| header)
            .map_err(|_| ProtocolError::MalformedFrame {
                expected: HEADER_SIZE,
                actual: frame.len(),
            })
    }

    /// The controller rejected the request
    #[inline]
    pub fn is_nack(&self) -> bool {
        self.direction & direction::FLAG_NACK != 0
    }
}

/// Frame a command for the wire
///
/// An oversized payload is a caller bug; debug builds assert, release builds
/// refuse the frame with `PayloadTooLarge`.
pub fn encode_command(
    command: u8,
    subcommand: u8,
    payload: &[u8],
) -> std::result::Result<Vec<u8>, TransportError> {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD,
        "command payload of {} bytes exceeds frame",
        payload.len()
    );
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::PayloadTooLarge(payload.len()));
    }

    let header = CommandHeader::outbound(command, subcommand, payload.len() as u8);
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

// =============================================================================
// Typed Commands
// =============================================================================

/// An outbound command before framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command: u8,
    pub subcommand: u8,
    pub payload: Vec<u8>,
}

impl Command {
    /// Frame this command for the wire
    pub fn encode(&self) -> std::result::Result<Vec<u8>, TransportError> {
        encode_command(self.command, self.subcommand, &self.payload)
    }
}

/// A command that can be serialized to a payload
pub trait ControllerCommand: Sized {
    /// Command id (e.g., `cmd::FLASH`)
    const CMD: u8;

    /// Subcommand id
    const SUBCMD: u8;

    /// Serialize the payload (without header)
    fn to_payload(&self) -> Vec<u8>;

    /// Build the unframed command
    fn build(&self) -> Command {
        Command {
            command: Self::CMD,
            subcommand: Self::SUBCMD,
            payload: self.to_payload(),
        }
    }
}

/// FLASH/READ request and the prefix of its reply (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FlashRead {
    pub size: u8,
    tag: u8,
    _reserved: [u8; 2],
    address: [u8; 4],
}

impl FlashRead {
    pub fn new(address: u32, size: u8) -> Self {
        Self {
            size,
            tag: flash::READ_TAG,
            _reserved: [0; 2],
            address: address.to_le_bytes(),
        }
    }

    #[inline]
    pub fn address(&self) -> u32 {
        u32::from_le_bytes(self.address)
    }
}

impl ControllerCommand for FlashRead {
    const CMD: u8 = cmd::FLASH;
    const SUBCMD: u8 = subcmd::flash::READ;
    fn to_payload(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// FEATSEL/SET_MASK with the fixed feature mask
#[derive(Debug, Clone, Copy, Default)]
pub struct SetFeatureMask;

impl ControllerCommand for SetFeatureMask {
    const CMD: u8 = cmd::FEATSEL;
    const SUBCMD: u8 = subcmd::featsel::SET_MASK;
    fn to_payload(&self) -> Vec<u8> {
        payload::FEATURE_MASK.to_vec()
    }
}

/// FEATSEL/ENABLE with a little-endian feature bitmask
#[derive(Debug, Clone, Copy)]
pub struct EnableFeatures {
    pub features: u32,
}

impl ControllerCommand for EnableFeatures {
    const CMD: u8 = cmd::FEATSEL;
    const SUBCMD: u8 = subcmd::featsel::ENABLE;
    fn to_payload(&self) -> Vec<u8> {
        self.features.to_le_bytes().to_vec()
    }
}

/// FW_INFO/GET, no payload
#[derive(Debug, Clone, Copy, Default)]
pub struct GetFirmwareInfo;

impl ControllerCommand for GetFirmwareInfo {
    const CMD: u8 = cmd::FW_INFO;
    const SUBCMD: u8 = subcmd::fw_info::GET;
    fn to_payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// NFC subcommand 1 with a zero payload; turns the haptics path on
#[derive(Debug, Clone, Copy, Default)]
pub struct EnableRumble;

impl ControllerCommand for EnableRumble {
    const CMD: u8 = cmd::NFC;
    const SUBCMD: u8 = subcmd::nfc::ENABLE_RUMBLE;
    fn to_payload(&self) -> Vec<u8> {
        payload::RUMBLE_ENABLE.to_vec()
    }
}

/// GRIP/ENABLE_BUTTONS
#[derive(Debug, Clone, Copy, Default)]
pub struct EnableGripButtons;

impl ControllerCommand for EnableGripButtons {
    const CMD: u8 = cmd::GRIP;
    const SUBCMD: u8 = subcmd::grip::ENABLE_BUTTONS;
    fn to_payload(&self) -> Vec<u8> {
        payload::GRIP_ENABLE.to_vec()
    }
}

/// LED/PATTERN for a player id
#[derive(Debug, Clone, Copy)]
pub struct SetPlayerLeds {
    pub player_id: u32,
}

impl SetPlayerLeds {
    pub fn pattern(&self) -> u8 {
        let index = (self.player_id % payload::PLAYER_PATTERNS.len() as u32) as usize;
        payload::PLAYER_PATTERNS[index]
    }
}

impl ControllerCommand for SetPlayerLeds {
    const CMD: u8 = cmd::LED;
    const SUBCMD: u8 = subcmd::led::PATTERN;
    fn to_payload(&self) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data[0] = self.pattern();
        data
    }
}

/// INIT/USB
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbInit;

impl ControllerCommand for UsbInit {
    const CMD: u8 = cmd::INIT;
    const SUBCMD: u8 = subcmd::init::USB;
    fn to_payload(&self) -> Vec<u8> {
        payload::USB_INIT.to_vec()
    }
}

// =============================================================================
// Replies
// =============================================================================

/// FW_INFO/GET reply payload (12 bytes)
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct FirmwareInfoData {
    major: u8,
    minor: u8,
    patch: u8,
    controller_type: u8,
    _unknown: [u8; 4],
    dsp_major: u8,
    dsp_minor: u8,
    dsp_patch: u8,
    dsp_type: i8,
}

const FIRMWARE_INFO_LEN: usize = std::mem::size_of::<FirmwareInfoData>();

impl From<FirmwareInfoData> for VersionInfo {
    fn from(raw: FirmwareInfoData) -> Self {
        let dsp = (raw.dsp_type >= 0).then_some(DspVersion {
            major: raw.dsp_major,
            minor: raw.dsp_minor,
            patch: raw.dsp_patch,
        });
        VersionInfo {
            major: raw.major,
            minor: raw.minor,
            patch: raw.patch,
            controller_type: raw.controller_type,
            dsp,
        }
    }
}

/// What a reply means to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Route to the calibration codec
    FlashRead,
    /// Capture version info
    FirmwareInfo,
    /// Unrecognized or uninteresting; dropped without error
    Ignored,
}

/// Map a (command, subcommand) pair to its handling
pub fn dispatch(command: u8, subcommand: u8) -> ReplyKind {
    match (command, subcommand) {
        (cmd::FLASH, subcmd::flash::READ) => ReplyKind::FlashRead,
        (cmd::FW_INFO, subcmd::fw_info::GET) => ReplyKind::FirmwareInfo,
        _ => ReplyKind::Ignored,
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<'a> {
    FlashRead {
        address: u32,
        size: u8,
        data: &'a [u8],
    },
    FirmwareInfo(VersionInfo),
    Ignored {
        command: u8,
        subcommand: u8,
    },
}

/// Decode an inbound frame
pub fn decode_reply(frame: &[u8]) -> Result<Reply<'_>> {
    let header = CommandHeader::parse(frame)?;
    let body = &frame[HEADER_SIZE..];

    if header.is_nack() {
        debug!(
            "Controller NACKed {} subcmd 0x{:02X}",
            cmd::name(header.command),
            header.subcommand
        );
    }

    match dispatch(header.command, header.subcommand) {
        ReplyKind::FlashRead => {
            let (read, _) =
                FlashRead::read_from_prefix(body).map_err(|_| ProtocolError::MalformedFrame {
                    expected: HEADER_SIZE + std::mem::size_of::<FlashRead>(),
                    actual: frame.len(),
                })?;
            let data_start = std::mem::size_of::<FlashRead>();
            let needed = data_start + usize::from(read.size);
            if body.len() < needed {
                return Err(ProtocolError::MalformedFrame {
                    expected: HEADER_SIZE + needed,
                    actual: frame.len(),
                });
            }
            Ok(Reply::FlashRead {
                address: read.address(),
                size: read.size,
                data: &body[data_start..needed],
            })
        }
        ReplyKind::FirmwareInfo => {
            let (raw, _) = FirmwareInfoData::read_from_prefix(body).map_err(|_| {
                ProtocolError::MalformedFrame {
                    expected: HEADER_SIZE + FIRMWARE_INFO_LEN,
                    actual: frame.len(),
                }
            })?;
            Ok(Reply::FirmwareInfo(raw.into()))
        }
        ReplyKind::Ignored => Ok(Reply::Ignored {
            command: header.command,
            subcommand: header.subcommand,
        }),
    }
}
