//! Initialization step table
//!
//! Maps each `InitStep` to what it does for a given controller type. The
//! session walks the table one sent command at a time and never waits for
//! the reply before moving on.

use crate::calibration::FlashRegion;
use crate::command::{
    Command, ControllerCommand, EnableFeatures, EnableGripButtons, EnableRumble, FlashRead,
    GetFirmwareInfo, SetFeatureMask, SetPlayerLeds, UsbInit,
};
use crate::protocol::payload;
use crate::types::{ControllerType, InitStep};

/// What a single init step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Send a command; the step is complete once it is submitted
    Send(Command),
    /// Nothing to do for this controller, fall through
    Skip,
    /// Initialization is finished; expose the input sink
    Finish,
}

/// Player id used for the LED pattern of a session without one
const NO_PLAYER: u32 = u32::MAX;

fn flash_read(region: FlashRegion) -> StepAction {
    StepAction::Send(FlashRead::new(region.address(), region.size()).build())
}

/// Action for `step`, given what is known about the controller so far
pub fn step_action(
    step: InitStep,
    controller_type: ControllerType,
    player_id: Option<u32>,
) -> StepAction {
    let two_sticks = controller_type.has_secondary_stick();
    match step {
        InitStep::Starting => StepAction::Skip,
        InitStep::ReadSerial => flash_read(FlashRegion::Serial),
        InitStep::ReadFactoryPrimaryCalib => flash_read(FlashRegion::FactoryPrimaryCalib),
        InitStep::ReadFactorySecondaryCalib if two_sticks => {
            flash_read(FlashRegion::FactorySecondaryCalib)
        }
        InitStep::ReadFactoryTriggerCalib if controller_type.is_gamecube() => {
            flash_read(FlashRegion::FactoryTriggerCalib)
        }
        InitStep::ReadUserPrimaryCalib => flash_read(FlashRegion::UserPrimaryCalib),
        InitStep::ReadUserSecondaryCalib if two_sticks => {
            flash_read(FlashRegion::UserSecondaryCalib)
        }
        InitStep::SetFeatureMask => StepAction::Send(SetFeatureMask.build()),
        InitStep::EnableFeatures => StepAction::Send(
            EnableFeatures {
                features: payload::ENABLED_FEATURES,
            }
            .build(),
        ),
        InitStep::GetFirmwareInfo => StepAction::Send(GetFirmwareInfo.build()),
        InitStep::EnableRumble if cfg!(feature = "rumble") => {
            StepAction::Send(EnableRumble.build())
        }
        InitStep::GripButtons if controller_type.is_joycon() => {
            StepAction::Send(EnableGripButtons.build())
        }
        InitStep::SetPlayerLeds => StepAction::Send(
            SetPlayerLeds {
                player_id: player_id.unwrap_or(NO_PLAYER),
            }
            .build(),
        ),
        InitStep::SendUsbInit => StepAction::Send(UsbInit.build()),
        InitStep::Done => StepAction::Finish,
        _ => StepAction::Skip,
    }
}

/// Steps that would send a command for this controller, in order
pub fn planned_steps(controller_type: ControllerType) -> Vec<InitStep> {
    let mut steps = Vec::new();
    let mut step = InitStep::Starting;
    while let Some(next) = step.next() {
        if matches!(step_action(next, controller_type, None), StepAction::Send(_)) {
            steps.push(next);
        }
        step = next;
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{cmd, flash, subcmd};

    fn sent(action: StepAction) -> Command {
        match action {
            StepAction::Send(command) => command,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[test]
    fn test_serial_read() {
        let command = sent(step_action(
            InitStep::ReadSerial,
            ControllerType::ProController,
            None,
        ));
        assert_eq!(command.command, cmd::FLASH);
        assert_eq!(command.subcommand, subcmd::flash::READ);
        assert_eq!(command.payload[0], flash::SIZE_SERIAL);
        assert_eq!(command.payload[4..8], flash::ADDR_SERIAL.to_le_bytes());
    }

    #[test]
    fn test_joycon_skips_secondary_stick() {
        for step in [
            InitStep::ReadFactorySecondaryCalib,
            InitStep::ReadUserSecondaryCalib,
            InitStep::ReadFactoryTriggerCalib,
        ] {
            assert_eq!(
                step_action(step, ControllerType::RightJoycon, None),
                StepAction::Skip
            );
        }
    }

    #[test]
    fn test_grip_only_on_joycon() {
        assert!(matches!(
            step_action(InitStep::GripButtons, ControllerType::LeftJoycon, None),
            StepAction::Send(_)
        ));
        assert_eq!(
            step_action(InitStep::GripButtons, ControllerType::ProController, None),
            StepAction::Skip
        );
    }

    #[test]
    fn test_gamecube_reads_triggers() {
        let command = sent(step_action(
            InitStep::ReadFactoryTriggerCalib,
            ControllerType::GameCubeController,
            None,
        ));
        assert_eq!(command.payload[0], flash::SIZE_FACTORY_TRIGGER_CALIB);
    }

    #[test]
    fn test_player_led_pattern() {
        let command = sent(step_action(
            InitStep::SetPlayerLeds,
            ControllerType::ProController,
            Some(9),
        ));
        assert_eq!(command.command, cmd::LED);
        assert_eq!(command.payload[0], payload::PLAYER_PATTERNS[1]);
    }

    #[test]
    fn test_player_leds_without_player() {
        let command = sent(step_action(
            InitStep::SetPlayerLeds,
            ControllerType::ProController,
            None,
        ));
        assert_eq!(command.payload[0], 0x6);
        assert_ne!(command.payload[0], payload::PLAYER_PATTERNS[0]);
    }

    #[test]
    fn test_done_finishes() {
        assert_eq!(
            step_action(InitStep::Done, ControllerType::ProController, None),
            StepAction::Finish
        );
    }

    #[test]
    fn test_planned_steps_per_type() {
        let pro = planned_steps(ControllerType::ProController);
        let gc = planned_steps(ControllerType::GameCubeController);
        let joycon = planned_steps(ControllerType::LeftJoycon);

        assert!(gc.contains(&InitStep::ReadFactoryTriggerCalib));
        assert!(!pro.contains(&InitStep::ReadFactoryTriggerCalib));
        assert!(joycon.contains(&InitStep::GripButtons));
        assert!(!joycon.contains(&InitStep::ReadFactorySecondaryCalib));
        assert!(pro.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pro.first(), Some(&InitStep::ReadSerial));
        assert_eq!(pro.last(), Some(&InitStep::SendUsbInit));
    }
}
