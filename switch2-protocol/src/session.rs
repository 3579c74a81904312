//! Per-controller session state
//!
//! A session is joined by two independent paths: the data path delivering
//! input reports, and the command path carrying the bulk command interface.
//! Either can attach first. Initialization runs over the command path and
//! the input sink is published once it is done and the data path is bound.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::calibration::{parse_serial, CalibrationSet, FlashRegion};
use crate::command::{decode_reply, Reply};
use crate::error::{ProtocolError, Result};
use crate::init::{planned_steps, step_action, StepAction};
use crate::protocol::HEADER_SIZE;
use crate::report::{decode_report, sink_descriptor};
use crate::types::{ControllerType, InitStep, VersionInfo};
use crate::{CommandPath, DataPath, InputSink};

#[cfg(feature = "rumble")]
use crate::rumble::RumbleScheduler;

/// Read-only snapshot of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub physical_path: String,
    pub controller_type: ControllerType,
    pub init_step: InitStep,
    pub serial: String,
    pub version: Option<VersionInfo>,
    pub calibration: CalibrationSet,
    pub player_id: Option<u32>,
    pub command_path_bound: bool,
    pub data_path_bound: bool,
    pub input_published: bool,
}

struct SessionState {
    init_step: InitStep,
    controller_type: ControllerType,
    calibration: CalibrationSet,
    version: Option<VersionInfo>,
    serial: String,
    player_id: Option<u32>,
    command_path: Option<Arc<dyn CommandPath>>,
    data_path: Option<Arc<dyn DataPath>>,
}

/// One physical controller
pub struct ControllerSession {
    physical_path: String,
    state: Mutex<SessionState>,
    sink: RwLock<Option<Arc<dyn InputSink>>>,
    #[cfg(feature = "rumble")]
    rumble: RumbleScheduler,
}

impl ControllerSession {
    pub fn new(physical_path: impl Into<String>) -> Self {
        let controller_type = ControllerType::default();
        Self {
            physical_path: physical_path.into(),
            state: Mutex::new(SessionState {
                init_step: InitStep::Starting,
                controller_type,
                calibration: CalibrationSet::default(),
                version: None,
                serial: String::new(),
                player_id: None,
                command_path: None,
                data_path: None,
            }),
            sink: RwLock::new(None),
            #[cfg(feature = "rumble")]
            rumble: RumbleScheduler::new(controller_type),
        }
    }

    pub fn physical_path(&self) -> &str {
        &self.physical_path
    }

    pub fn init_step(&self) -> InitStep {
        self.state.lock().init_step
    }

    pub fn controller_type(&self) -> ControllerType {
        self.state.lock().controller_type
    }

    pub fn calibration(&self) -> CalibrationSet {
        self.state.lock().calibration
    }

    pub fn player_id(&self) -> Option<u32> {
        self.state.lock().player_id
    }

    pub fn has_command_path(&self) -> bool {
        self.state.lock().command_path.is_some()
    }

    pub fn has_data_path(&self) -> bool {
        self.state.lock().data_path.is_some()
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            physical_path: self.physical_path.clone(),
            controller_type: state.controller_type,
            init_step: state.init_step,
            serial: state.serial.clone(),
            version: state.version,
            calibration: state.calibration,
            player_id: state.player_id,
            command_path_bound: state.command_path.is_some(),
            data_path_bound: state.data_path.is_some(),
            input_published: self.sink.read().is_some(),
        }
    }

    /// The published input sink, if initialization has completed
    pub fn current_sink(&self) -> Option<Arc<dyn InputSink>> {
        self.sink.read().clone()
    }

    /// Issue the next pending init step
    ///
    /// Steps that do not apply to this controller are passed over without
    /// I/O. A step only counts as done once its command was submitted, so a
    /// failed send is retried on the next call. No-op once `Done`.
    pub fn advance(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.advance_locked(&mut state)
    }

    fn advance_locked(&self, state: &mut SessionState) -> Result<()> {
        if state.init_step.is_done() {
            return Ok(());
        }
        let command_path = state
            .command_path
            .clone()
            .ok_or(ProtocolError::NotConnected)?;

        if state.init_step == InitStep::Starting {
            debug!(
                path = %self.physical_path,
                steps = ?planned_steps(state.controller_type),
                "Starting initialization"
            );
        }
        while let Some(next) = state.init_step.next() {
            match step_action(next, state.controller_type, state.player_id) {
                StepAction::Skip => {
                    trace!(step = ?next, "Init step skipped");
                    state.init_step = next;
                }
                StepAction::Send(command) => {
                    command_path.send_command(
                        command.command,
                        command.subcommand,
                        &command.payload,
                    )?;
                    debug!(step = ?next, "Init step issued");
                    state.init_step = next;
                    return Ok(());
                }
                StepAction::Finish => {
                    state.init_step = next;
                    info!(
                        path = %self.physical_path,
                        controller = %state.controller_type,
                        "Controller initialized"
                    );
                    self.publish_input(state);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Create the input sink on the data path, replacing any previous one
    fn publish_input(&self, state: &SessionState) {
        let Some(data_path) = state.data_path.as_ref() else {
            debug!("Init done without a data path, input deferred");
            return;
        };

        let descriptor = sink_descriptor(
            state.controller_type,
            &state.serial,
            cfg!(feature = "rumble"),
        );
        match data_path.open_sink(&descriptor) {
            Ok(sink) => {
                *self.sink.write() = Some(sink);
                if let Some(version) = state.version {
                    info!("Firmware version {}", version);
                }
            }
            Err(e) => warn!("Failed to create input device: {}", e),
        }
    }

    /// Handle one frame from the command interface
    ///
    /// Any frame kicks the next init step before the reply itself is
    /// processed, so the first reply after attach starts initialization.
    pub fn receive_command(&self, frame: &[u8]) -> Result<()> {
        if frame.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame {
                expected: HEADER_SIZE,
                actual: frame.len(),
            });
        }
        trace!("Command reply: {:02X?}", &frame[..frame.len().min(16)]);

        let mut state = self.state.lock();
        if !state.init_step.is_done() {
            if let Err(e) = self.advance_locked(&mut state) {
                debug!("Init step not issued: {}", e);
            }
        }

        match decode_reply(frame)? {
            Reply::FlashRead {
                address,
                size,
                data,
            } => Self::handle_flash_read(&mut state, address, size, data),
            Reply::FirmwareInfo(version) => {
                debug!("Firmware info: {}", version);
                state.version = Some(version);
                match ControllerType::from_byte(version.controller_type) {
                    Some(controller_type) => {
                        state.controller_type = controller_type;
                        #[cfg(feature = "rumble")]
                        self.rumble.set_controller_type(controller_type);
                    }
                    None => warn!(
                        "Unknown controller type {:#04x}",
                        version.controller_type
                    ),
                }
            }
            Reply::Ignored {
                command,
                subcommand,
            } => {
                trace!(command, subcommand, "Reply ignored");
            }
        }
        Ok(())
    }

    fn handle_flash_read(state: &mut SessionState, address: u32, size: u8, data: &[u8]) {
        let Some(region) = FlashRegion::from_address(address) else {
            debug!("Unexpected flash read at {:#x}", address);
            return;
        };
        if size != region.size() {
            debug!(
                ?region,
                size,
                expected = region.size(),
                "Flash read size mismatch"
            );
            return;
        }

        match region {
            FlashRegion::Serial => {
                state.serial = parse_serial(data);
                debug!(serial = %state.serial, "Got serial number");
            }
            _ => {
                state.calibration.apply(region, data);
            }
        }
    }

    /// Decode one input report and deliver it to the published sink
    ///
    /// Reports are decoded even before the sink exists so malformed input
    /// is reported the same way in every state.
    pub fn receive_report(&self, report: &[u8]) -> Result<()> {
        let calibration = self.state.lock().calibration;
        let events = decode_report(report, &calibration)?;
        if events.is_empty() {
            return Ok(());
        }
        if let Some(sink) = self.current_sink() {
            if let Err(e) = sink.emit(&events) {
                debug!("Input events dropped: {}", e);
            }
        }
        Ok(())
    }

    /// Force-feedback request; only touches the rumble lock
    #[cfg(feature = "rumble")]
    pub fn set_intensity(&self, strong: u16, weak: u16) {
        self.rumble.set_intensity(strong, weak);
    }

    #[cfg(feature = "rumble")]
    pub fn rumble_state(&self) -> crate::rumble::RumbleState {
        self.rumble.state()
    }

    /// Bind the command path; kicks initialization when the data path is already bound
    pub(crate) fn bind_command_path(&self, path: Arc<dyn CommandPath>) {
        let mut state = self.state.lock();
        state.command_path = Some(path);
        if state.data_path.is_none() {
            return;
        }
        if state.init_step.is_done() {
            self.publish_input(&state);
        } else if let Err(e) = self.advance_locked(&mut state) {
            debug!("Init step not issued: {}", e);
        }
    }

    /// Bind the data path and its player id
    pub(crate) fn bind_data_path(&self, path: Arc<dyn DataPath>, player_id: Option<u32>) {
        #[cfg(feature = "rumble")]
        self.rumble.attach_output(Arc::clone(&path));

        let mut state = self.state.lock();
        state.data_path = Some(path);
        state.player_id = player_id;
        if state.init_step.is_done() {
            self.publish_input(&state);
        } else if state.command_path.is_some() {
            if let Err(e) = self.advance_locked(&mut state) {
                debug!("Init step not issued: {}", e);
            }
        }
    }

    /// Unbind the command path and withdraw the input sink
    pub(crate) fn unbind_command_path(&self) {
        let mut state = self.state.lock();
        state.command_path = None;
        self.interrupt_init(&mut state);
    }

    /// Unbind the data path, returning the player id it held
    pub(crate) fn unbind_data_path(&self) -> Option<u32> {
        #[cfg(feature = "rumble")]
        self.rumble.detach_output();

        let mut state = self.state.lock();
        state.data_path = None;
        self.interrupt_init(&mut state);
        state.player_id.take()
    }

    /// Unfinished initialization restarts from `Starting` on the next attach
    fn interrupt_init(&self, state: &mut SessionState) {
        if state.init_step != InitStep::Starting && !state.init_step.is_done() {
            debug!(
                path = %self.physical_path,
                step = ?state.init_step,
                "Initialization interrupted"
            );
            state.init_step = InitStep::Starting;
        }
        if self.sink.write().take().is_some() {
            debug!(path = %self.physical_path, "Input device withdrawn");
        }
    }

    /// Stop any rumble emission and wait for the task to exit
    pub(crate) async fn cancel_rumble(&self) {
        #[cfg(feature = "rumble")]
        self.rumble.cancel().await;
    }

    pub(crate) fn is_detached(&self) -> bool {
        let state = self.state.lock();
        state.command_path.is_none() && state.data_path.is_none()
    }
}

impl std::fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSession")
            .field("physical_path", &self.physical_path)
            .field("init_step", &self.init_step())
            .finish_non_exhaustive()
    }
}
