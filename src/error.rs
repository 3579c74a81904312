//! Driver error types

use switch2_protocol::TransportError;
use thiserror::Error;

/// Errors from device discovery and transport setup
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Controller not found: {0}")]
    NotFound(String),

    #[error("No bulk command interface on {0}")]
    NoCommandInterface(String),

    #[error("No HID interface for {0}")]
    NoHidInterface(String),

    #[error("USB error: {0}")]
    Usb(#[from] std::io::Error),

    #[error("HID error: {0}")]
    Hid(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("udev monitor error: {0}")]
    Hotplug(#[source] std::io::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<hidapi::HidError> for DriverError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            DriverError::HidPermissionDenied(msg)
        } else {
            DriverError::Hid(msg)
        }
    }
}

/// Map a hidapi write failure onto the engine's transport error
pub(crate) fn hid_transport_error(e: hidapi::HidError) -> TransportError {
    TransportError::Io(e.to_string())
}
