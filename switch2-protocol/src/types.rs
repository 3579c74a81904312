//! Common types for the protocol engine

use std::fmt;

/// Controller variant, learned from the firmware info reply
///
/// Until the firmware has reported its type the session carries the
/// zero type code, `LeftJoycon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerType {
    #[default]
    LeftJoycon,
    RightJoycon,
    ProController,
    GameCubeController,
}

impl ControllerType {
    /// Decode the type byte of the firmware info reply
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::LeftJoycon),
            0x01 => Some(Self::RightJoycon),
            0x02 => Some(Self::ProController),
            0x03 => Some(Self::GameCubeController),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::LeftJoycon => 0x00,
            Self::RightJoycon => 0x01,
            Self::ProController => 0x02,
            Self::GameCubeController => 0x03,
        }
    }

    #[inline]
    pub fn is_joycon(self) -> bool {
        matches!(self, Self::LeftJoycon | Self::RightJoycon)
    }

    /// Whether the controller carries a second analog stick
    #[inline]
    pub fn has_secondary_stick(self) -> bool {
        !self.is_joycon()
    }

    #[inline]
    pub fn is_gamecube(self) -> bool {
        self == Self::GameCubeController
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftJoycon => "Joy-Con (L)",
            Self::RightJoycon => "Joy-Con (R)",
            Self::ProController => "Pro Controller",
            Self::GameCubeController => "GameCube Controller",
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Initialization progress, in the order the steps are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum InitStep {
    #[default]
    Starting,
    ReadSerial,
    ReadFactoryPrimaryCalib,
    ReadFactorySecondaryCalib,
    ReadFactoryTriggerCalib,
    ReadUserPrimaryCalib,
    ReadUserSecondaryCalib,
    SetFeatureMask,
    EnableFeatures,
    GetFirmwareInfo,
    EnableRumble,
    GripButtons,
    SetPlayerLeds,
    SendUsbInit,
    Done,
}

impl InitStep {
    /// The step after this one, `None` once `Done`
    pub fn next(self) -> Option<Self> {
        use InitStep::*;
        Some(match self {
            Starting => ReadSerial,
            ReadSerial => ReadFactoryPrimaryCalib,
            ReadFactoryPrimaryCalib => ReadFactorySecondaryCalib,
            ReadFactorySecondaryCalib => ReadFactoryTriggerCalib,
            ReadFactoryTriggerCalib => ReadUserPrimaryCalib,
            ReadUserPrimaryCalib => ReadUserSecondaryCalib,
            ReadUserSecondaryCalib => SetFeatureMask,
            SetFeatureMask => EnableFeatures,
            EnableFeatures => GetFirmwareInfo,
            GetFirmwareInfo => EnableRumble,
            EnableRumble => GripButtons,
            GripButtons => SetPlayerLeds,
            SetPlayerLeds => SendUsbInit,
            SendUsbInit => Done,
            Done => return None,
        })
    }

    #[inline]
    pub fn is_done(self) -> bool {
        self == InitStep::Done
    }
}

/// DSP firmware sub-version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DspVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Firmware metadata from the FW_INFO reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Raw controller type byte
    pub controller_type: u8,
    /// Absent when the DSP type byte is negative
    pub dsp: Option<DspVersion>,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} ({})",
            self.major, self.minor, self.patch, self.controller_type
        )?;
        if let Some(dsp) = self.dsp {
            write!(f, ", DSP {}.{}.{}", dsp.major, dsp.minor, dsp.patch)?;
        }
        Ok(())
    }
}

/// Logical gamepad buttons, named after the evdev codes they map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    South,
    East,
    North,
    West,
    TL,
    TR,
    TL2,
    TR2,
    Select,
    Start,
    Mode,
    ThumbL,
    ThumbR,
    C,
    GripL,
    GripR,
    Record,
}

/// Logical absolute axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    RX,
    RY,
    Z,
    RZ,
    Hat0X,
    Hat0Y,
}

/// A decoded input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: i32 },
    /// End of one decoded report
    Sync,
}

/// Range parameters of one absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSetup {
    pub axis: Axis,
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

/// Everything an input sink needs to expose a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDescriptor {
    pub controller_type: ControllerType,
    /// Unique id, taken from the flash serial
    pub serial: String,
    pub buttons: Vec<Button>,
    pub axes: Vec<AxisSetup>,
    /// Rumble requests are accepted through `ControllerSession::set_intensity`
    pub force_feedback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_type_bytes() {
        for byte in 0..4u8 {
            let ty = ControllerType::from_byte(byte).unwrap();
            assert_eq!(ty.as_byte(), byte);
        }
        assert_eq!(ControllerType::from_byte(4), None);
    }

    #[test]
    fn test_stick_count() {
        assert!(!ControllerType::LeftJoycon.has_secondary_stick());
        assert!(!ControllerType::RightJoycon.has_secondary_stick());
        assert!(ControllerType::ProController.has_secondary_stick());
        assert!(ControllerType::GameCubeController.has_secondary_stick());
    }

    #[test]
    fn test_init_steps_strictly_increase() {
        let mut step = InitStep::Starting;
        let mut count = 0;
        while let Some(next) = step.next() {
            assert!(next > step);
            step = next;
            count += 1;
        }
        assert_eq!(step, InitStep::Done);
        assert_eq!(count, 14);
    }

    #[test]
    fn test_version_display() {
        let version = VersionInfo {
            major: 1,
            minor: 2,
            patch: 3,
            controller_type: 2,
            dsp: Some(DspVersion {
                major: 0,
                minor: 9,
                patch: 1,
            }),
        };
        assert_eq!(version.to_string(), "1.2.3 (2), DSP 0.9.1");
    }
}
