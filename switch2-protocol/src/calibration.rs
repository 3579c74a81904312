//! Flash calibration block parsing
//!
//! Stick calibration is stored as six 12-bit values packed into nine bytes:
//! x-neutral, y-neutral, x-positive, y-positive, x-negative, y-negative.
//! Each pair of values shares three bytes, low nibble first.

use tracing::debug;

use crate::protocol::flash;

/// Neutral point and travel of one axis, in raw 12-bit units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisCalibration {
    pub neutral: u16,
    pub negative: u16,
    pub positive: u16,
}

impl AxisCalibration {
    /// All three values are nonzero and usable for scaling
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.neutral != 0 && self.negative != 0 && self.positive != 0
    }
}

/// Calibration of one analog stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickCalibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

impl StickCalibration {
    /// Pack into the nine-byte flash layout
    pub fn to_bytes(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        pack_pair(&mut out[0..3], self.x.neutral, self.y.neutral);
        pack_pair(&mut out[3..6], self.x.positive, self.y.positive);
        pack_pair(&mut out[6..9], self.x.negative, self.y.negative);
        out
    }
}

/// Zero offsets of the analog triggers (GameCube controller only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerZero {
    pub left: u8,
    pub right: u8,
}

fn unpack_pair(bytes: &[u8]) -> (u16, u16) {
    let first = u16::from(bytes[0]) | (u16::from(bytes[1] & 0x0F) << 8);
    let second = u16::from(bytes[1] >> 4) | (u16::from(bytes[2]) << 4);
    (first, second)
}

fn pack_pair(out: &mut [u8], first: u16, second: u16) {
    out[0] = first as u8;
    out[1] = ((first >> 8) as u8 & 0x0F) | ((second as u8 & 0x0F) << 4);
    out[2] = (second >> 4) as u8;
}

/// Parse a factory stick calibration block
///
/// Returns `None` for the uncalibrated sentinel (all bytes 0xFF).
pub fn parse_stick(data: &[u8; 9]) -> Option<StickCalibration> {
    if data.iter().all(|&b| b == 0xFF) {
        return None;
    }

    let (x_neutral, y_neutral) = unpack_pair(&data[0..3]);
    let (x_positive, y_positive) = unpack_pair(&data[3..6]);
    let (x_negative, y_negative) = unpack_pair(&data[6..9]);

    Some(StickCalibration {
        x: AxisCalibration {
            neutral: x_neutral,
            negative: x_negative,
            positive: x_positive,
        },
        y: AxisCalibration {
            neutral: y_neutral,
            negative: y_negative,
            positive: y_positive,
        },
    })
}

/// Parse a user stick calibration block (LE16 magic followed by a stick block)
pub fn parse_user_stick(data: &[u8; 11]) -> Option<StickCalibration> {
    if u16::from_le_bytes([data[0], data[1]]) != flash::USER_CALIB_MAGIC {
        return None;
    }
    let stick: &[u8; 9] = data[2..].try_into().ok()?;
    parse_stick(stick)
}

/// Parse the trigger zero block; absent if either byte is 0xFF
pub fn parse_trigger_zero(data: &[u8; 2]) -> Option<TriggerZero> {
    if data[0] == 0xFF || data[1] == 0xFF {
        return None;
    }
    Some(TriggerZero {
        left: data[0],
        right: data[1],
    })
}

/// Serial number block: ASCII, NUL-terminated when shorter than the block
pub fn parse_serial(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Flash blocks read during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashRegion {
    Serial,
    FactoryPrimaryCalib,
    FactorySecondaryCalib,
    FactoryTriggerCalib,
    UserPrimaryCalib,
    UserSecondaryCalib,
}

impl FlashRegion {
    pub fn from_address(address: u32) -> Option<Self> {
        match address {
            flash::ADDR_SERIAL => Some(Self::Serial),
            flash::ADDR_FACTORY_PRIMARY_CALIB => Some(Self::FactoryPrimaryCalib),
            flash::ADDR_FACTORY_SECONDARY_CALIB => Some(Self::FactorySecondaryCalib),
            flash::ADDR_FACTORY_TRIGGER_CALIB => Some(Self::FactoryTriggerCalib),
            flash::ADDR_USER_PRIMARY_CALIB => Some(Self::UserPrimaryCalib),
            flash::ADDR_USER_SECONDARY_CALIB => Some(Self::UserSecondaryCalib),
            _ => None,
        }
    }

    pub fn address(self) -> u32 {
        match self {
            Self::Serial => flash::ADDR_SERIAL,
            Self::FactoryPrimaryCalib => flash::ADDR_FACTORY_PRIMARY_CALIB,
            Self::FactorySecondaryCalib => flash::ADDR_FACTORY_SECONDARY_CALIB,
            Self::FactoryTriggerCalib => flash::ADDR_FACTORY_TRIGGER_CALIB,
            Self::UserPrimaryCalib => flash::ADDR_USER_PRIMARY_CALIB,
            Self::UserSecondaryCalib => flash::ADDR_USER_SECONDARY_CALIB,
        }
    }

    /// Block size the read must report
    pub fn size(self) -> u8 {
        match self {
            Self::Serial => flash::SIZE_SERIAL,
            Self::FactoryPrimaryCalib | Self::FactorySecondaryCalib => {
                flash::SIZE_FACTORY_AXIS_CALIB
            }
            Self::FactoryTriggerCalib => flash::SIZE_FACTORY_TRIGGER_CALIB,
            Self::UserPrimaryCalib | Self::UserSecondaryCalib => flash::SIZE_USER_AXIS_CALIB,
        }
    }
}

/// Stick slot holding factory and user calibration side by side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickSlot {
    pub factory: Option<StickCalibration>,
    pub user: Option<StickCalibration>,
}

impl StickSlot {
    /// User calibration wins whenever a valid one was read
    pub fn effective(&self) -> Option<StickCalibration> {
        self.user.or(self.factory)
    }
}

/// Every calibration value read from flash for one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationSet {
    /// Primary (left) and secondary (right) stick
    pub sticks: [StickSlot; 2],
    pub triggers: Option<TriggerZero>,
}

impl CalibrationSet {
    /// Calibration in effect for a stick slot
    pub fn stick(&self, slot: usize) -> Option<StickCalibration> {
        self.sticks.get(slot).and_then(StickSlot::effective)
    }

    /// Trigger zero offsets, zero when never read
    pub fn trigger_zero(&self) -> TriggerZero {
        self.triggers.unwrap_or_default()
    }

    /// Store a calibration block that already passed the size check
    ///
    /// A block that fails its own validity check leaves the previous value
    /// in place. Returns true when a value was stored.
    pub fn apply(&mut self, region: FlashRegion, data: &[u8]) -> bool {
        match region {
            FlashRegion::FactoryPrimaryCalib | FlashRegion::FactorySecondaryCalib => {
                let slot = usize::from(region == FlashRegion::FactorySecondaryCalib);
                let parsed = data.try_into().ok().and_then(parse_stick);
                match parsed {
                    Some(calib) => {
                        log_stick(region, &calib);
                        self.sticks[slot].factory = Some(calib);
                        true
                    }
                    None => {
                        debug!(?region, "Stick calibration not present");
                        false
                    }
                }
            }
            FlashRegion::UserPrimaryCalib | FlashRegion::UserSecondaryCalib => {
                let slot = usize::from(region == FlashRegion::UserSecondaryCalib);
                let parsed = data.try_into().ok().and_then(parse_user_stick);
                match parsed {
                    Some(calib) => {
                        log_stick(region, &calib);
                        self.sticks[slot].user = Some(calib);
                        true
                    }
                    None => {
                        debug!(?region, "No user stick calibration present");
                        false
                    }
                }
            }
            FlashRegion::FactoryTriggerCalib => {
                match data.try_into().ok().and_then(parse_trigger_zero) {
                    Some(zero) => {
                        debug!(
                            left = zero.left,
                            right = zero.right,
                            "Got factory trigger calibration"
                        );
                        self.triggers = Some(zero);
                        true
                    }
                    None => {
                        debug!("Factory trigger calibration not present");
                        false
                    }
                }
            }
            FlashRegion::Serial => false,
        }
    }
}

fn log_stick(region: FlashRegion, calib: &StickCalibration) {
    debug!(
        ?region,
        "Got stick calibration: x {}/{}/{}, y {}/{}/{} (negative/neutral/positive)",
        calib.x.negative,
        calib.x.neutral,
        calib.x.positive,
        calib.y.negative,
        calib.y.neutral,
        calib.y.positive
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncalibrated_sentinel() {
        assert_eq!(parse_stick(&[0xFF; 9]), None);
    }

    #[test]
    fn test_parse_stick_unpacks_nibbles() {
        let data = [0x00, 0x08, 0x80, 0x34, 0x12, 0x56, 0xAB, 0xCD, 0xEF];
        let calib = parse_stick(&data).unwrap();
        assert_eq!(calib.x.neutral, 0x800);
        assert_eq!(calib.y.neutral, 0x800);
        assert_eq!(calib.x.positive, 0x234);
        assert_eq!(calib.y.positive, 0x561);
        assert_eq!(calib.x.negative, 0xDAB);
        assert_eq!(calib.y.negative, 0xEFC);
    }

    #[test]
    fn test_to_bytes_inverts_parse() {
        let data = [0x00, 0x08, 0x80, 0x34, 0x12, 0x56, 0xAB, 0xCD, 0xEF];
        let calib = parse_stick(&data).unwrap();
        assert_eq!(calib.to_bytes(), data);
    }

    #[test]
    fn test_user_stick_requires_magic() {
        let mut data = [0u8; 11];
        data[2..].copy_from_slice(&[0x00, 0x08, 0x80, 0x34, 0x12, 0x56, 0xAB, 0xCD, 0xEF]);
        assert_eq!(parse_user_stick(&data), None);

        data[0] = 0xB2;
        data[1] = 0xA1;
        let calib = parse_user_stick(&data).unwrap();
        assert_eq!(calib.x.neutral, 0x800);
    }

    #[test]
    fn test_trigger_zero() {
        assert_eq!(
            parse_trigger_zero(&[0x10, 0x12]),
            Some(TriggerZero {
                left: 0x10,
                right: 0x12
            })
        );
        assert_eq!(parse_trigger_zero(&[0xFF, 0x12]), None);
        assert_eq!(parse_trigger_zero(&[0x10, 0xFF]), None);
    }

    #[test]
    fn test_serial_stops_at_nul() {
        let mut data = [0u8; 16];
        data[..6].copy_from_slice(b"HEJ123");
        assert_eq!(parse_serial(&data), "HEJ123");
        assert_eq!(parse_serial(b"0123456789ABCDEF"), "0123456789ABCDEF");
    }

    #[test]
    fn test_region_lookup() {
        let region = FlashRegion::from_address(0x1FC080).unwrap();
        assert_eq!(region, FlashRegion::UserSecondaryCalib);
        assert_eq!(region.size(), 11);
        assert_eq!(region.address(), 0x1FC080);
        assert_eq!(FlashRegion::from_address(0x12345), None);
    }

    #[test]
    fn test_user_calibration_wins_regardless_of_order() {
        let factory = [0x00, 0x08, 0x80, 0x00, 0x06, 0x60, 0x00, 0x06, 0x60];
        let mut user = [0u8; 11];
        user[..2].copy_from_slice(&flash::USER_CALIB_MAGIC.to_le_bytes());
        user[2..].copy_from_slice(&[0x10, 0x08, 0x80, 0x00, 0x05, 0x50, 0x00, 0x05, 0x50]);

        let mut set = CalibrationSet::default();
        assert!(set.apply(FlashRegion::UserPrimaryCalib, &user));
        assert!(set.apply(FlashRegion::FactoryPrimaryCalib, &factory));
        assert_eq!(set.stick(0).unwrap().x.neutral, 0x810);
        assert_eq!(set.stick(1), None);
    }

    #[test]
    fn test_invalid_block_keeps_previous_value() {
        let factory = [0x00, 0x08, 0x80, 0x00, 0x06, 0x60, 0x00, 0x06, 0x60];
        let mut set = CalibrationSet::default();
        assert!(set.apply(FlashRegion::FactorySecondaryCalib, &factory));
        assert!(!set.apply(FlashRegion::FactorySecondaryCalib, &[0xFF; 9]));
        assert_eq!(set.stick(1).unwrap().x.neutral, 0x800);
    }

    #[test]
    fn test_trigger_zero_defaults_to_zero() {
        let mut set = CalibrationSet::default();
        assert_eq!(set.trigger_zero(), TriggerZero::default());
        assert!(set.apply(FlashRegion::FactoryTriggerCalib, &[0x20, 0x22]));
        assert_eq!(set.trigger_zero().right, 0x22);
    }
}
