//! Protocol engine for Nintendo Switch 2 controllers
//!
//! This crate holds everything that does not touch a real device:
//!
//! - Command framing and reply decoding
//! - The initialization sequence (serial, calibration, firmware info, features)
//! - Flash calibration parsing
//! - Input report decoding into normalized events
//! - Rumble waveform encoding and scheduling (feature `rumble`)
//! - Per-device sessions joined from two independently attaching paths
//!
//! Transports plug in through [`CommandPath`], [`DataPath`] and [`InputSink`].

pub mod calibration;
pub mod command;
pub mod device_registry;
pub mod error;
pub mod init;
pub mod protocol;
pub mod registry;
pub mod report;
pub mod session;
pub mod types;

#[cfg(feature = "rumble")]
pub mod rumble;

pub use calibration::{
    parse_serial, parse_stick, parse_trigger_zero, parse_user_stick, AxisCalibration,
    CalibrationSet, FlashRegion, StickCalibration, StickSlot, TriggerZero,
};
pub use command::{decode_reply, encode_command, Command, ControllerCommand, Reply};
pub use device_registry::{is_supported, SUPPORTED_PIDS, VENDOR_ID};
pub use error::{ProtocolError, Result, SinkError, TransportError};
pub use init::{step_action, StepAction};
pub use registry::{SessionRegistry, MAX_PLAYERS};
pub use report::{decode_report, report_axis, report_trigger, sink_descriptor};
pub use session::{ControllerSession, SessionInfo};
pub use types::{
    Axis, AxisSetup, Button, ControllerType, DspVersion, InitStep, InputEvent, SinkDescriptor,
    VersionInfo,
};

use std::sync::Arc;

/// Sends commands to a controller's bulk command interface
///
/// Sends are fire-and-forget: a successful return means the frame was
/// queued, not that the controller answered.
pub trait CommandPath: Send + Sync {
    fn send_command(
        &self,
        command: u8,
        subcommand: u8,
        payload: &[u8],
    ) -> std::result::Result<(), TransportError>;
}

/// The report-delivering side of a controller
pub trait DataPath: Send + Sync {
    /// Create the input sink the decoded events are delivered to
    fn open_sink(
        &self,
        descriptor: &SinkDescriptor,
    ) -> std::result::Result<Arc<dyn InputSink>, SinkError>;

    /// Write one output report (used for rumble packets)
    fn write_output_report(&self, report: &[u8]) -> std::result::Result<(), TransportError>;
}

/// Receives decoded input events
pub trait InputSink: Send + Sync {
    /// Emit one report's worth of events, terminated by `InputEvent::Sync`
    fn emit(&self, events: &[InputEvent]) -> std::result::Result<(), SinkError>;
}
