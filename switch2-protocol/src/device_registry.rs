//! Device registry - supported controllers by USB product id
//!
//! The product id is only used to find controllers on the bus. The session
//! learns its `ControllerType` from the firmware info reply, not from here.

use crate::types::ControllerType;

/// Nintendo vendor ID
pub const VENDOR_ID: u16 = 0x057E;

pub const PID_JOYCON_R: u16 = 0x2066;
pub const PID_JOYCON_L: u16 = 0x2067;
pub const PID_PRO_CONTROLLER: u16 = 0x2069;
pub const PID_GAMECUBE: u16 = 0x2073;

/// All product ids handled by the driver
pub const SUPPORTED_PIDS: &[u16] = &[
    PID_JOYCON_R,
    PID_JOYCON_L,
    PID_PRO_CONTROLLER,
    PID_GAMECUBE,
];

/// USB interface class of the bulk command interface
pub const COMMAND_INTERFACE_CLASS: u8 = 0xFF;

/// Check if a vendor/product pair is a supported controller
#[inline]
pub fn is_supported(vid: u16, pid: u16) -> bool {
    vid == VENDOR_ID && SUPPORTED_PIDS.contains(&pid)
}

/// Controller type a product id is sold as, for display before init completes
pub fn expected_type(pid: u16) -> Option<ControllerType> {
    match pid {
        PID_JOYCON_L => Some(ControllerType::LeftJoycon),
        PID_JOYCON_R => Some(ControllerType::RightJoycon),
        PID_PRO_CONTROLLER => Some(ControllerType::ProController),
        PID_GAMECUBE => Some(ControllerType::GameCubeController),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pids_supported() {
        assert!(is_supported(VENDOR_ID, 0x2066));
        assert!(is_supported(VENDOR_ID, 0x2067));
        assert!(is_supported(VENDOR_ID, 0x2069));
        assert!(is_supported(VENDOR_ID, 0x2073));
    }

    #[test]
    fn test_other_vendor_not_supported() {
        assert!(!is_supported(0x3151, 0x2069));
        assert!(!is_supported(VENDOR_ID, 0x2009)); // Switch 1 Pro Controller
    }

    #[test]
    fn test_expected_type() {
        assert_eq!(
            expected_type(PID_GAMECUBE),
            Some(ControllerType::GameCubeController)
        );
        assert_eq!(expected_type(0x0000), None);
    }
}
