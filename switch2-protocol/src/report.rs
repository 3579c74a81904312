//! Input report decoding
//!
//! Each controller type has its own report id and a table mapping logical
//! buttons to (byte, bit) positions. Button offsets are relative to byte 3,
//! the first button byte after the report id and counters.

use crate::calibration::{AxisCalibration, CalibrationSet, StickCalibration};
use crate::error::{ProtocolError, Result};
use crate::protocol::{axis, report_id};
use crate::types::{Axis, AxisSetup, Button, ControllerType, InputEvent, SinkDescriptor};

/// Reports shorter than this are rejected before any table lookup
pub const MIN_REPORT_LEN: usize = 15;

/// First button byte
const BUTTON_BASE: usize = 3;

/// Right button byte
mod btn_r {
    pub const B: u8 = 1 << 0;
    pub const A: u8 = 1 << 1;
    pub const Y: u8 = 1 << 2;
    pub const X: u8 = 1 << 3;
    pub const R: u8 = 1 << 4;
    pub const ZR: u8 = 1 << 5;
    pub const PLUS: u8 = 1 << 6;
    pub const RS: u8 = 1 << 7;
}

/// Left button byte
mod btn_l {
    pub const DOWN: u8 = 1 << 0;
    pub const RIGHT: u8 = 1 << 1;
    pub const LEFT: u8 = 1 << 2;
    pub const UP: u8 = 1 << 3;
    pub const L: u8 = 1 << 4;
    pub const ZL: u8 = 1 << 5;
    pub const MINUS: u8 = 1 << 6;
    pub const LS: u8 = 1 << 7;
}

/// Third button byte; meaning of the low bits depends on the controller
mod btn_3 {
    pub const HOME: u8 = 1 << 0;
    pub const CAPTURE: u8 = 1 << 1;
    pub const GRIP_R: u8 = 1 << 2;
    pub const GRIP_L: u8 = 1 << 3;
    pub const C: u8 = 1 << 4;

    /// Joy-Con (L) reports capture on bit 0 and its grip button on bit 2
    pub const JCL_CAPTURE: u8 = 1 << 0;
    pub const JCL_GRIP: u8 = 1 << 2;
}

/// Position of one button in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonMapping {
    pub button: Button,
    /// Offset from the first button byte
    pub offset: usize,
    pub mask: u8,
}

const fn map(button: Button, offset: usize, mask: u8) -> ButtonMapping {
    ButtonMapping {
        button,
        offset,
        mask,
    }
}

pub const LEFT_JOYCON_BUTTONS: &[ButtonMapping] = &[
    map(Button::TL, 0, btn_l::L),
    map(Button::TL2, 0, btn_l::ZL),
    map(Button::Select, 0, btn_l::MINUS),
    map(Button::ThumbL, 0, btn_l::LS),
    map(Button::GripL, 1, btn_3::JCL_GRIP),
    map(Button::Record, 1, btn_3::JCL_CAPTURE),
];

pub const RIGHT_JOYCON_BUTTONS: &[ButtonMapping] = &[
    map(Button::South, 0, btn_r::A),
    map(Button::East, 0, btn_r::B),
    map(Button::North, 0, btn_r::X),
    map(Button::West, 0, btn_r::Y),
    map(Button::TR, 0, btn_r::R),
    map(Button::TR2, 0, btn_r::ZR),
    map(Button::Start, 0, btn_r::PLUS),
    map(Button::ThumbR, 0, btn_r::RS),
    map(Button::C, 1, btn_3::C),
    map(Button::GripR, 1, btn_3::GRIP_R),
    map(Button::Mode, 1, btn_3::HOME),
];

pub const PRO_CONTROLLER_BUTTONS: &[ButtonMapping] = &[
    map(Button::South, 0, btn_r::A),
    map(Button::East, 0, btn_r::B),
    map(Button::North, 0, btn_r::X),
    map(Button::West, 0, btn_r::Y),
    map(Button::TL, 1, btn_l::L),
    map(Button::TR, 0, btn_r::R),
    map(Button::TL2, 1, btn_l::ZL),
    map(Button::TR2, 0, btn_r::ZR),
    map(Button::Select, 1, btn_l::MINUS),
    map(Button::Start, 0, btn_r::PLUS),
    map(Button::ThumbL, 1, btn_l::LS),
    map(Button::ThumbR, 0, btn_r::RS),
    map(Button::Mode, 2, btn_3::HOME),
    map(Button::Record, 2, btn_3::CAPTURE),
    map(Button::GripR, 2, btn_3::GRIP_R),
    map(Button::GripL, 2, btn_3::GRIP_L),
    map(Button::C, 2, btn_3::C),
];

pub const GAMECUBE_BUTTONS: &[ButtonMapping] = &[
    map(Button::South, 0, btn_r::A),
    map(Button::East, 0, btn_r::B),
    map(Button::North, 0, btn_r::X),
    map(Button::West, 0, btn_r::Y),
    map(Button::TL, 1, btn_l::L),
    map(Button::TR, 0, btn_r::R),
    map(Button::TL2, 1, btn_l::ZL),
    map(Button::TR2, 0, btn_r::ZR),
    map(Button::Select, 1, btn_l::MINUS),
    map(Button::Start, 0, btn_r::PLUS),
    map(Button::Mode, 2, btn_3::HOME),
    map(Button::Record, 2, btn_3::CAPTURE),
    map(Button::C, 2, btn_3::C),
];

/// Position of one stick sample and the axes it drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickLayout {
    /// Absolute byte offset of the 3-byte sample
    pub offset: usize,
    /// Calibration slot (0 primary, 1 secondary)
    pub slot: usize,
    pub x: Axis,
    pub y: Axis,
}

/// Byte layout of one report id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub report_id: u8,
    pub controller_type: ControllerType,
    pub buttons: &'static [ButtonMapping],
    /// Absolute offset of the byte carrying the d-pad bits
    pub hat: Option<usize>,
    pub sticks: &'static [StickLayout],
    /// Absolute offsets of the left and right trigger bytes
    pub triggers: Option<(usize, usize)>,
}

impl ReportLayout {
    /// Smallest report that covers every field of this layout
    pub fn min_len(&self) -> usize {
        let buttons = self
            .buttons
            .iter()
            .map(|m| BUTTON_BASE + m.offset + 1)
            .max()
            .unwrap_or(0);
        let hat = self.hat.map_or(0, |h| h + 1);
        let sticks = self.sticks.iter().map(|s| s.offset + 3).max().unwrap_or(0);
        let triggers = self.triggers.map_or(0, |(l, r)| l.max(r) + 1);
        buttons.max(hat).max(sticks).max(triggers)
    }
}

pub const LEFT_JOYCON_LAYOUT: ReportLayout = ReportLayout {
    report_id: report_id::JOYCON_L,
    controller_type: ControllerType::LeftJoycon,
    buttons: LEFT_JOYCON_BUTTONS,
    hat: Some(3),
    sticks: &[StickLayout {
        offset: 6,
        slot: 0,
        x: Axis::X,
        y: Axis::Y,
    }],
    triggers: None,
};

pub const RIGHT_JOYCON_LAYOUT: ReportLayout = ReportLayout {
    report_id: report_id::JOYCON_R,
    controller_type: ControllerType::RightJoycon,
    buttons: RIGHT_JOYCON_BUTTONS,
    hat: None,
    sticks: &[StickLayout {
        offset: 6,
        slot: 0,
        x: Axis::RX,
        y: Axis::RY,
    }],
    triggers: None,
};

const DUAL_STICKS: &[StickLayout] = &[
    StickLayout {
        offset: 6,
        slot: 0,
        x: Axis::X,
        y: Axis::Y,
    },
    StickLayout {
        offset: 9,
        slot: 1,
        x: Axis::RX,
        y: Axis::RY,
    },
];

pub const PRO_CONTROLLER_LAYOUT: ReportLayout = ReportLayout {
    report_id: report_id::PRO,
    controller_type: ControllerType::ProController,
    buttons: PRO_CONTROLLER_BUTTONS,
    hat: Some(4),
    sticks: DUAL_STICKS,
    triggers: None,
};

pub const GAMECUBE_LAYOUT: ReportLayout = ReportLayout {
    report_id: report_id::GAMECUBE,
    controller_type: ControllerType::GameCubeController,
    buttons: GAMECUBE_BUTTONS,
    hat: Some(4),
    sticks: DUAL_STICKS,
    triggers: Some((13, 14)),
};

/// Layout for a report id; `None` for the unified report and unknown ids
pub fn layout_for_report(id: u8) -> Option<&'static ReportLayout> {
    match id {
        report_id::JOYCON_L => Some(&LEFT_JOYCON_LAYOUT),
        report_id::JOYCON_R => Some(&RIGHT_JOYCON_LAYOUT),
        report_id::PRO => Some(&PRO_CONTROLLER_LAYOUT),
        report_id::GAMECUBE => Some(&GAMECUBE_LAYOUT),
        _ => None,
    }
}

/// Layout a controller type reports with
pub fn layout_for_type(controller_type: ControllerType) -> &'static ReportLayout {
    match controller_type {
        ControllerType::LeftJoycon => &LEFT_JOYCON_LAYOUT,
        ControllerType::RightJoycon => &RIGHT_JOYCON_LAYOUT,
        ControllerType::ProController => &PRO_CONTROLLER_LAYOUT,
        ControllerType::GameCubeController => &GAMECUBE_LAYOUT,
    }
}

/// Normalize a raw 12-bit stick sample to the signed 16-bit axis range
///
/// With a complete calibration the travel on each side of the measured
/// neutral point is scaled independently. Without one the sample is assumed
/// centered at 2048. `negate` flips the sign before clamping.
pub fn report_axis(raw: u16, calib: Option<&AxisCalibration>, negate: bool) -> i32 {
    let raw = i32::from(raw);
    let value = match calib.filter(|c| c.is_complete()) {
        Some(c) => {
            let value = (raw - i32::from(c.neutral)) * (axis::MAX + 1);
            if value < 0 {
                value / i32::from(c.negative)
            } else {
                value / i32::from(c.positive)
            }
        }
        None => (raw - axis::RAW_CENTER) * 16,
    };

    let value = if negate { -value } else { value };
    value.clamp(axis::MIN, axis::MAX)
}

/// Normalize a raw trigger byte to `0..=TRIGGER_RANGE`
pub fn report_trigger(raw: u8, zero: u8) -> i32 {
    let span = axis::TRIGGER_FULL - i32::from(zero);
    if span == 0 {
        return axis::TRIGGER_RANGE;
    }
    let value = (axis::TRIGGER_RANGE + 1) * (i32::from(raw) - i32::from(zero)) / span;
    value.clamp(0, axis::TRIGGER_RANGE)
}

/// D-pad axes from the left button byte
pub fn hat_from_byte(byte: u8) -> (i32, i32) {
    let bit = |mask: u8| i32::from(byte & mask != 0);
    (
        bit(btn_l::RIGHT) - bit(btn_l::LEFT),
        bit(btn_l::DOWN) - bit(btn_l::UP),
    )
}

/// Raw 12-bit (x, y) from a 3-byte stick sample
#[inline]
pub fn unpack_stick(data: &[u8]) -> (u16, u16) {
    let x = u16::from(data[0]) | (u16::from(data[1] & 0x0F) << 8);
    let y = u16::from(data[1] >> 4) | (u16::from(data[2]) << 4);
    (x, y)
}

fn push_stick(
    events: &mut Vec<InputEvent>,
    layout: &StickLayout,
    calib: Option<StickCalibration>,
    data: &[u8],
) {
    let (x, y) = unpack_stick(&data[layout.offset..layout.offset + 3]);
    events.push(InputEvent::Axis {
        axis: layout.x,
        value: report_axis(x, calib.as_ref().map(|c| &c.x), false),
    });
    events.push(InputEvent::Axis {
        axis: layout.y,
        value: report_axis(y, calib.as_ref().map(|c| &c.y), true),
    });
}

/// Decode one input report into events, terminated by `InputEvent::Sync`
///
/// The unified report is recognized but not decoded and yields no events.
pub fn decode_report(data: &[u8], calibration: &CalibrationSet) -> Result<Vec<InputEvent>> {
    if data.len() < MIN_REPORT_LEN {
        return Err(ProtocolError::MalformedFrame {
            expected: MIN_REPORT_LEN,
            actual: data.len(),
        });
    }

    let id = data[0];
    if id == report_id::UNIFIED {
        return Ok(Vec::new());
    }
    let layout = layout_for_report(id).ok_or(ProtocolError::UnsupportedReport(id))?;
    let min_len = layout.min_len();
    if data.len() < min_len {
        return Err(ProtocolError::MalformedFrame {
            expected: min_len,
            actual: data.len(),
        });
    }

    let mut events = Vec::with_capacity(layout.buttons.len() + 9);
    for mapping in layout.buttons {
        events.push(InputEvent::Button {
            button: mapping.button,
            pressed: data[BUTTON_BASE + mapping.offset] & mapping.mask != 0,
        });
    }

    if let Some(hat) = layout.hat {
        let (hat_x, hat_y) = hat_from_byte(data[hat]);
        events.push(InputEvent::Axis {
            axis: Axis::Hat0X,
            value: hat_x,
        });
        events.push(InputEvent::Axis {
            axis: Axis::Hat0Y,
            value: hat_y,
        });
    }

    for stick in layout.sticks {
        push_stick(&mut events, stick, calibration.stick(stick.slot), data);
    }

    if let Some((left, right)) = layout.triggers {
        let zero = calibration.trigger_zero();
        events.push(InputEvent::Axis {
            axis: Axis::Z,
            value: report_trigger(data[left], zero.left),
        });
        events.push(InputEvent::Axis {
            axis: Axis::RZ,
            value: report_trigger(data[right], zero.right),
        });
    }

    events.push(InputEvent::Sync);
    Ok(events)
}

/// Capabilities the input sink must expose for a controller type
pub fn sink_descriptor(
    controller_type: ControllerType,
    serial: &str,
    force_feedback: bool,
) -> SinkDescriptor {
    let layout = layout_for_type(controller_type);
    let stick_axis = |axis| AxisSetup {
        axis,
        min: axis::MIN,
        max: axis::MAX,
        fuzz: axis::FUZZ,
        flat: axis::FLAT,
    };

    let mut axes = Vec::new();
    for stick in layout.sticks {
        axes.push(stick_axis(stick.x));
        axes.push(stick_axis(stick.y));
    }
    if layout.triggers.is_some() {
        for axis in [Axis::Z, Axis::RZ] {
            axes.push(AxisSetup {
                axis,
                min: 0,
                max: axis::TRIGGER_RANGE,
                fuzz: axis::FUZZ,
                flat: axis::FLAT,
            });
        }
    }
    if layout.hat.is_some() {
        for axis in [Axis::Hat0X, Axis::Hat0Y] {
            axes.push(AxisSetup {
                axis,
                min: -1,
                max: 1,
                fuzz: 0,
                flat: 0,
            });
        }
    }

    SinkDescriptor {
        controller_type,
        serial: serial.to_string(),
        buttons: layout.buttons.iter().map(|m| m.button).collect(),
        axes,
        force_feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{parse_stick, FlashRegion};

    fn pressed(events: &[InputEvent], button: Button) -> bool {
        events.iter().any(|e| {
            matches!(e, InputEvent::Button { button: b, pressed: true } if *b == button)
        })
    }

    fn axis_value(events: &[InputEvent], axis: Axis) -> Option<i32> {
        events.iter().find_map(|e| match e {
            InputEvent::Axis { axis: a, value } if *a == axis => Some(*value),
            _ => None,
        })
    }

    /// 2048/2048 packed as a stick sample
    const CENTERED: [u8; 3] = [0x00, 0x08, 0x80];

    fn report(id: u8) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[0] = id;
        data[6..9].copy_from_slice(&CENTERED);
        data[9..12].copy_from_slice(&CENTERED);
        data
    }

    #[test]
    fn test_short_report_rejected() {
        let result = decode_report(&[report_id::PRO; 14], &CalibrationSet::default());
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                expected: 15,
                actual: 14
            })
        ));
    }

    #[test]
    fn test_unknown_report_rejected() {
        let result = decode_report(&report(0x30), &CalibrationSet::default());
        assert_eq!(result, Err(ProtocolError::UnsupportedReport(0x30)));
    }

    #[test]
    fn test_unified_report_yields_nothing() {
        let events =
            decode_report(&report(report_id::UNIFIED), &CalibrationSet::default()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_layouts_fit_minimum_report() {
        for layout in [
            &LEFT_JOYCON_LAYOUT,
            &RIGHT_JOYCON_LAYOUT,
            &PRO_CONTROLLER_LAYOUT,
            &GAMECUBE_LAYOUT,
        ] {
            assert!(layout.min_len() <= MIN_REPORT_LEN);
        }
        assert_eq!(GAMECUBE_LAYOUT.min_len(), 15);
    }

    #[test]
    fn test_pro_buttons() {
        let mut data = report(report_id::PRO);
        data[3] = btn_r::A | btn_r::ZR;
        data[4] = btn_l::MINUS;
        data[5] = btn_3::HOME | btn_3::GRIP_L;
        let events = decode_report(&data, &CalibrationSet::default()).unwrap();
        assert!(pressed(&events, Button::South));
        assert!(pressed(&events, Button::TR2));
        assert!(pressed(&events, Button::Select));
        assert!(pressed(&events, Button::Mode));
        assert!(pressed(&events, Button::GripL));
        assert!(!pressed(&events, Button::East));
        assert!(!pressed(&events, Button::GripR));
        assert_eq!(events.last(), Some(&InputEvent::Sync));
    }

    #[test]
    fn test_left_joycon_hat_and_buttons() {
        let mut data = report(report_id::JOYCON_L);
        data[3] = btn_l::UP | btn_l::RIGHT | btn_l::L;
        data[4] = btn_3::JCL_CAPTURE;
        let events = decode_report(&data, &CalibrationSet::default()).unwrap();
        assert_eq!(axis_value(&events, Axis::Hat0X), Some(1));
        assert_eq!(axis_value(&events, Axis::Hat0Y), Some(-1));
        assert!(pressed(&events, Button::TL));
        assert!(pressed(&events, Button::Record));
        assert_eq!(axis_value(&events, Axis::X), Some(0));
        assert_eq!(axis_value(&events, Axis::RX), None);
    }

    #[test]
    fn test_right_joycon_uses_right_axes() {
        let mut data = report(report_id::JOYCON_R);
        data[4] = btn_3::HOME;
        let events = decode_report(&data, &CalibrationSet::default()).unwrap();
        assert!(pressed(&events, Button::Mode));
        assert_eq!(axis_value(&events, Axis::RX), Some(0));
        assert_eq!(axis_value(&events, Axis::RY), Some(0));
        assert_eq!(axis_value(&events, Axis::Hat0X), None);
    }

    #[test]
    fn test_gamecube_triggers() {
        let mut data = report(report_id::GAMECUBE);
        data[13] = 232;
        data[14] = 0;
        let mut calibration = CalibrationSet::default();
        calibration.apply(FlashRegion::FactoryTriggerCalib, &[0x20, 0x20]);
        let events = decode_report(&data, &calibration).unwrap();
        assert_eq!(axis_value(&events, Axis::Z), Some(axis::TRIGGER_RANGE));
        assert_eq!(axis_value(&events, Axis::RZ), Some(0));
    }

    #[test]
    fn test_axis_fallback_is_linear() {
        assert_eq!(report_axis(2048, None, false), 0);
        assert_eq!(report_axis(2048 + 100, None, false), 1600);
        assert_eq!(report_axis(2048 + 100, None, true), -1600);
        assert_eq!(report_axis(4095, None, false), 32752);
        assert_eq!(report_axis(0, None, false), -32768);
        assert_eq!(report_axis(0, None, true), 32767);
    }

    #[test]
    fn test_axis_calibrated_scaling() {
        let calib = AxisCalibration {
            neutral: 2000,
            negative: 1000,
            positive: 1500,
        };
        assert_eq!(report_axis(2000, Some(&calib), false), 0);
        assert_eq!(report_axis(3500, Some(&calib), false), 32767);
        assert_eq!(report_axis(1000, Some(&calib), false), -32768);
        assert_eq!(report_axis(2750, Some(&calib), false), 16384);
    }

    #[test]
    fn test_partial_calibration_falls_back() {
        let calib = AxisCalibration {
            neutral: 2000,
            negative: 0,
            positive: 1500,
        };
        assert_eq!(report_axis(2048, Some(&calib), false), 0);
    }

    #[test]
    fn test_trigger_divide_by_zero_guard() {
        assert_eq!(report_trigger(0, 232), axis::TRIGGER_RANGE);
        assert_eq!(report_trigger(255, 232), axis::TRIGGER_RANGE);
    }

    #[test]
    fn test_trigger_scaling() {
        assert_eq!(report_trigger(0, 0), 0);
        assert_eq!(report_trigger(116, 0), 2048);
        assert_eq!(report_trigger(250, 0), axis::TRIGGER_RANGE);
        assert_eq!(report_trigger(10, 20), 0);
    }

    #[test]
    fn test_unpack_stick() {
        assert_eq!(unpack_stick(&CENTERED), (2048, 2048));
        assert_eq!(unpack_stick(&[0xFF, 0xFF, 0xFF]), (4095, 4095));
    }

    #[test]
    fn test_calibrated_neutral_reads_zero() {
        let calib = parse_stick(&[0x00, 0x08, 0x80, 0x00, 0x06, 0x60, 0x00, 0x06, 0x60]).unwrap();
        let (x, y) = unpack_stick(&CENTERED);
        assert_eq!(report_axis(x, Some(&calib.x), false), 0);
        assert_eq!(report_axis(y, Some(&calib.y), true), 0);
    }

    #[test]
    fn test_sink_descriptor_axes() {
        let desc = sink_descriptor(ControllerType::GameCubeController, "SN", true);
        let axes: Vec<Axis> = desc.axes.iter().map(|a| a.axis).collect();
        assert_eq!(
            axes,
            vec![
                Axis::X,
                Axis::Y,
                Axis::RX,
                Axis::RY,
                Axis::Z,
                Axis::RZ,
                Axis::Hat0X,
                Axis::Hat0Y
            ]
        );
        assert_eq!(desc.buttons.len(), GAMECUBE_BUTTONS.len());
        assert!(desc.force_feedback);

        let desc = sink_descriptor(ControllerType::RightJoycon, "SN", false);
        let axes: Vec<Axis> = desc.axes.iter().map(|a| a.axis).collect();
        assert_eq!(axes, vec![Axis::RX, Axis::RY]);
    }
}
