//! Property-based tests for the calibration codec and the value transforms.
//!
//! Uses proptest with 500 cases per property. Inputs cover the full raw
//! ranges, including values a real controller never sends.

use proptest::prelude::*;
use switch2_protocol::calibration::{AxisCalibration, StickCalibration};
use switch2_protocol::init::planned_steps;
use switch2_protocol::protocol::axis;
use switch2_protocol::{
    decode_reply, decode_report, parse_stick, parse_user_stick, report_axis, report_trigger,
    CalibrationSet, ControllerType,
};

fn axis_calibration() -> impl Strategy<Value = AxisCalibration> {
    (0u16..4096, 0u16..4096, 0u16..4096).prop_map(|(neutral, negative, positive)| {
        AxisCalibration {
            neutral,
            negative,
            positive,
        }
    })
}

fn stick_calibration() -> impl Strategy<Value = StickCalibration> {
    (axis_calibration(), axis_calibration()).prop_map(|(x, y)| StickCalibration { x, y })
}

fn controller_type() -> impl Strategy<Value = ControllerType> {
    prop_oneof![
        Just(ControllerType::LeftJoycon),
        Just(ControllerType::RightJoycon),
        Just(ControllerType::ProController),
        Just(ControllerType::GameCubeController),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Values packed into a flash block come back out unchanged.
    #[test]
    fn prop_stick_block_recovers_values(calib in stick_calibration()) {
        let bytes = calib.to_bytes();
        let parsed = parse_stick(&bytes);
        if bytes.iter().all(|&b| b == 0xFF) {
            prop_assert_eq!(parsed, None);
        } else {
            prop_assert_eq!(parsed, Some(calib));
        }
    }

    /// A user block without the magic is absent whatever follows it.
    #[test]
    fn prop_user_block_needs_magic(magic in any::<u16>(), rest in any::<[u8; 9]>()) {
        prop_assume!(magic != 0xA1B2);
        let mut block = [0u8; 11];
        block[..2].copy_from_slice(&magic.to_le_bytes());
        block[2..].copy_from_slice(&rest);
        prop_assert_eq!(parse_user_stick(&block), None);
    }

    /// A sample at the calibrated neutral point reads zero, with or without negation.
    #[test]
    fn prop_neutral_reads_zero(
        neutral in 1u16..4096,
        negative in 1u16..4096,
        positive in 1u16..4096,
        negate in any::<bool>(),
    ) {
        let calib = AxisCalibration { neutral, negative, positive };
        prop_assert_eq!(report_axis(neutral, Some(&calib), negate), 0);
    }

    /// Normalized axis values stay in the signed 16-bit range.
    #[test]
    fn prop_axis_in_range(
        raw in any::<u16>(),
        neutral in any::<u16>(),
        negative in any::<u16>(),
        positive in any::<u16>(),
        negate in any::<bool>(),
        calibrated in any::<bool>(),
    ) {
        let calib = AxisCalibration { neutral, negative, positive };
        let value = report_axis(raw, calibrated.then_some(&calib), negate);
        prop_assert!((axis::MIN..=axis::MAX).contains(&value), "value {value}");
    }

    /// Trigger values stay in range for every zero offset, including full pull.
    #[test]
    fn prop_trigger_in_range(raw in any::<u8>(), zero in any::<u8>()) {
        let value = report_trigger(raw, zero);
        prop_assert!((0..=axis::TRIGGER_RANGE).contains(&value), "value {value}");
    }

    /// Arbitrary bytes never panic the report decoder.
    #[test]
    fn prop_report_decoder_total(data in proptest::collection::vec(any::<u8>(), 0..80)) {
        let _ = decode_report(&data, &CalibrationSet::default());
    }

    /// Arbitrary bytes never panic the reply decoder.
    #[test]
    fn prop_reply_decoder_total(data in proptest::collection::vec(any::<u8>(), 0..80)) {
        let _ = decode_reply(&data);
    }

    /// The planned init sequence is strictly increasing for every controller type.
    #[test]
    fn prop_init_plan_monotonic(ty in controller_type()) {
        let steps = planned_steps(ty);
        prop_assert!(steps.windows(2).all(|w| w[0] < w[1]));
    }
}

#[cfg(feature = "rumble")]
mod rumble_props {
    use super::controller_type;
    use proptest::prelude::*;
    use switch2_protocol::protocol::rumble;
    use switch2_protocol::rumble::RumbleState;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Every packet carries the tag and the wrapping 4-bit sequence.
        #[test]
        fn prop_sequence_in_header(ty in controller_type(), count in 1usize..64) {
            let mut state = RumbleState::new(ty);
            state.set_intensity(0x8000, 0x8000);
            for n in 0..count {
                let packet = state.next_packet();
                prop_assert_eq!(packet.bytes[1], rumble::SEQ_TAG | (n as u8 & 0x0F));
            }
        }

        /// Error diffusion averages to the requested amplitude.
        #[test]
        fn prop_erm_duty_cycle(amplitude in 1u16..=u16::MAX) {
            let mut state = RumbleState::new(switch2_protocol::ControllerType::GameCubeController);
            state.set_intensity(amplitude, 0);
            let total = 1000u32;
            let on = (0..total)
                .filter(|_| state.next_packet().bytes[2] == rumble::GC_ON)
                .count() as f64;
            let expected = f64::from(amplitude) / f64::from(u16::MAX) * f64::from(total);
            prop_assert!((on - expected).abs() <= 2.0, "on {on}, expected {expected}");
        }
    }
}
