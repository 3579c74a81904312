//! Nintendo Switch 2 wired controller driver
//!
//! Hosts the `switch2-protocol` engine: USB bulk command path, hidraw data
//! path, uinput gamepad output, discovery and hotplug.

pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod gamepad;
pub mod hid;
pub mod usb;

pub use config::DriverConfig;
pub use daemon::{wait_for_init, BoundController, Daemon};
pub use discovery::{find_controller, list_controllers, ControllerDevice, HotplugEvent};
pub use error::DriverError;
pub use gamepad::{DiscardSink, VirtualGamepad};
pub use hid::{HidDataPath, SinkMode};
pub use usb::UsbCommandPath;
