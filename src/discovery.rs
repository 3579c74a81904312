//! Controller discovery
//!
//! A controller shows up twice: as a USB device whose vendor interface
//! carries the bulk command endpoints, and as a hidraw node delivering input
//! reports. Both are keyed by the canonical sysfs directory of the USB device.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use hidapi::HidApi;
use switch2_protocol::device_registry::{expected_type, is_supported};
use tracing::debug;

use crate::error::DriverError;

/// A connected controller
#[derive(Debug, Clone)]
pub struct ControllerDevice {
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    /// Canonical sysfs directory of the USB device
    pub physical_path: PathBuf,
    /// hidraw node, once the kernel has bound the HID interface
    pub hidraw: Option<CString>,
    pub usb: nusb::DeviceInfo,
}

impl ControllerDevice {
    /// Physical path as the session key
    pub fn key(&self) -> String {
        self.physical_path.to_string_lossy().into_owned()
    }

    /// Kernel device name (e.g. `1-2`)
    pub fn name(&self) -> String {
        self.physical_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Human readable product, from the product id
    pub fn product(&self) -> &'static str {
        expected_type(self.product_id).map_or("Unknown", |t| t.name())
    }

    /// Whether `selector` names this controller by device name or sysfs path
    pub fn matches(&self, selector: &str) -> bool {
        self.name() == selector || Path::new(selector) == self.physical_path
    }
}

/// USB device directory backing a hidraw node (`/dev/hidrawN`)
///
/// `/sys/class/hidraw/hidrawN/device` resolves to the HID device, whose
/// parent is the USB interface and grandparent the USB device.
pub fn hidraw_physical_path(node: &Path) -> Option<PathBuf> {
    let name = node.file_name()?;
    let hid = Path::new("/sys/class/hidraw")
        .join(name)
        .join("device")
        .canonicalize()
        .ok()?;
    usb_device_of_hid(&hid)
}

/// Strip the HID and interface components from a canonical HID sysfs path
pub fn usb_device_of_hid(hid: &Path) -> Option<PathBuf> {
    Some(hid.parent()?.parent()?.to_path_buf())
}

/// hidraw nodes of supported controllers, with their physical paths
fn hidraw_nodes() -> Result<Vec<(PathBuf, CString)>, DriverError> {
    let api = HidApi::new()?;
    let mut nodes = Vec::new();
    for info in api.device_list() {
        if !is_supported(info.vendor_id(), info.product_id()) {
            continue;
        }
        let node = info.path().to_owned();
        let Some(physical) = node
            .to_str()
            .ok()
            .and_then(|p| hidraw_physical_path(Path::new(p)))
        else {
            debug!("No sysfs path for {:?}", node);
            continue;
        };
        nodes.push((physical, node));
    }
    Ok(nodes)
}

/// Enumerate connected controllers
pub fn list_controllers() -> Result<Vec<ControllerDevice>, DriverError> {
    let hidraw = match hidraw_nodes() {
        Ok(nodes) => nodes,
        Err(e) => {
            debug!("hidraw enumeration failed: {}", e);
            Vec::new()
        }
    };

    let mut controllers = Vec::new();
    for info in nusb::list_devices()? {
        if !is_supported(info.vendor_id(), info.product_id()) {
            continue;
        }
        let physical_path = info
            .sysfs_path()
            .canonicalize()
            .unwrap_or_else(|_| info.sysfs_path().to_path_buf());
        let hidraw_node = hidraw
            .iter()
            .find(|(path, _)| *path == physical_path)
            .map(|(_, node)| node.clone());

        debug!(
            "Found controller {:04x}:{:04x} at {}",
            info.vendor_id(),
            info.product_id(),
            physical_path.display()
        );
        controllers.push(ControllerDevice {
            product_id: info.product_id(),
            bus_number: info.bus_number(),
            device_address: info.device_address(),
            physical_path,
            hidraw: hidraw_node,
            usb: info,
        });
    }
    Ok(controllers)
}

/// Pick one controller, by selector or the first found
pub fn find_controller(selector: Option<&str>) -> Result<ControllerDevice, DriverError> {
    let controllers = list_controllers()?;
    let found = match selector {
        Some(selector) => controllers.into_iter().find(|c| c.matches(selector)),
        None => controllers.into_iter().next(),
    };
    found.ok_or_else(|| DriverError::NotFound(selector.unwrap_or("any").to_string()))
}

/// Parse a sysfs hex id attribute (`idVendor`, `idProduct`)
pub fn parse_hex_id(value: &str) -> Option<u16> {
    u16::from_str_radix(value.trim(), 16).ok()
}

/// Controller arrival or departure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

#[cfg(feature = "hotplug")]
pub use monitor::HotplugMonitor;

#[cfg(feature = "hotplug")]
mod monitor {
    use futures::StreamExt;
    use tokio_udev::{AsyncMonitorSocket, EventType, MonitorBuilder};
    use tracing::warn;

    use super::{parse_hex_id, HotplugEvent};
    use crate::error::DriverError;
    use switch2_protocol::device_registry::is_supported;

    /// udev monitor for USB device add/remove
    pub struct HotplugMonitor {
        socket: AsyncMonitorSocket,
    }

    impl HotplugMonitor {
        pub fn new() -> Result<Self, DriverError> {
            let socket = MonitorBuilder::new()
                .and_then(|b| b.match_subsystem_devtype("usb", "usb_device"))
                .and_then(|b| b.listen())
                .map_err(DriverError::Hotplug)?;
            let socket = AsyncMonitorSocket::new(socket).map_err(DriverError::Hotplug)?;
            Ok(Self { socket })
        }

        /// Wait for the next controller event; `None` when the monitor closes
        ///
        /// Removals are reported for every USB device, since attributes are
        /// gone by then; the caller ignores paths it does not know.
        pub async fn next_event(&mut self) -> Option<HotplugEvent> {
            while let Some(event) = self.socket.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("udev monitor error: {}", e);
                        continue;
                    }
                };
                let path = event.syspath().to_path_buf();
                match event.event_type() {
                    EventType::Add => {
                        let id = |name: &str| {
                            event
                                .attribute_value(name)
                                .and_then(|v| v.to_str())
                                .and_then(parse_hex_id)
                        };
                        if let (Some(vid), Some(pid)) = (id("idVendor"), id("idProduct")) {
                            if is_supported(vid, pid) {
                                return Some(HotplugEvent::Added(path));
                            }
                        }
                    }
                    EventType::Remove => return Some(HotplugEvent::Removed(path)),
                    _ => {}
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_device_of_hid() {
        let hid = Path::new(
            "/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/0003:057E:2069.0005",
        );
        assert_eq!(
            usb_device_of_hid(hid),
            Some(PathBuf::from("/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2"))
        );
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("057e\n"), Some(0x057E));
        assert_eq!(parse_hex_id("2069"), Some(0x2069));
        assert_eq!(parse_hex_id("zz"), None);
    }
}
