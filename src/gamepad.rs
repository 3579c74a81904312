//! Virtual gamepad device using evdev/uinput
//!
//! Exposes one decoded controller as a standard Linux gamepad. When force
//! feedback is advertised, games upload FF_RUMBLE effects to the device and
//! a thread turns their playback into intensity requests.

use std::collections::HashMap;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, FFEffectKind, FFEffectType,
    InputEvent as EvdevEvent, InputEventKind, InputId, Key, UInputEventType, UinputAbsSetup,
};
use parking_lot::Mutex;
use switch2_protocol::{Axis, Button, InputEvent, InputSink, SinkDescriptor, SinkError};
use tracing::{debug, info, trace, warn};

/// Effect slots offered to games
pub const MAX_EFFECTS: u32 = 16;

/// Poll timeout of the force-feedback thread, bounds shutdown latency
const FF_POLL_MS: libc::c_int = 100;

/// Receives `(strong, weak)` rumble magnitudes from effect playback
pub type RumbleHandler = Box<dyn Fn(u16, u16) + Send + Sync>;

/// Grip paddle codes, not named by evdev
const BTN_GRIPL: Key = Key::new(0x224);
const BTN_GRIPR: Key = Key::new(0x225);

/// Convert a logical button to its evdev key
pub fn button_code(button: Button) -> Key {
    match button {
        Button::South => Key::BTN_SOUTH,
        Button::East => Key::BTN_EAST,
        Button::North => Key::BTN_NORTH,
        Button::West => Key::BTN_WEST,
        Button::TL => Key::BTN_TL,
        Button::TR => Key::BTN_TR,
        Button::TL2 => Key::BTN_TL2,
        Button::TR2 => Key::BTN_TR2,
        Button::Select => Key::BTN_SELECT,
        Button::Start => Key::BTN_START,
        Button::Mode => Key::BTN_MODE,
        Button::ThumbL => Key::BTN_THUMBL,
        Button::ThumbR => Key::BTN_THUMBR,
        Button::C => Key::BTN_C,
        Button::GripL => BTN_GRIPL,
        Button::GripR => BTN_GRIPR,
        Button::Record => Key::KEY_RECORD,
    }
}

/// Convert a logical axis to its evdev absolute axis
pub fn axis_code(axis: Axis) -> AbsoluteAxisType {
    match axis {
        Axis::X => AbsoluteAxisType::ABS_X,
        Axis::Y => AbsoluteAxisType::ABS_Y,
        Axis::RX => AbsoluteAxisType::ABS_RX,
        Axis::RY => AbsoluteAxisType::ABS_RY,
        Axis::Z => AbsoluteAxisType::ABS_Z,
        Axis::RZ => AbsoluteAxisType::ABS_RZ,
        Axis::Hat0X => AbsoluteAxisType::ABS_HAT0X,
        Axis::Hat0Y => AbsoluteAxisType::ABS_HAT0Y,
    }
}

/// Translate a decoded batch into evdev events
///
/// The sync marker is dropped; `VirtualDevice::emit` appends its own.
pub fn to_evdev(events: &[InputEvent]) -> Vec<EvdevEvent> {
    events
        .iter()
        .filter_map(|event| match *event {
            InputEvent::Button { button, pressed } => Some(EvdevEvent::new_now(
                EventType::KEY,
                button_code(button).code(),
                i32::from(pressed),
            )),
            InputEvent::Axis { axis, value } => Some(EvdevEvent::new_now(
                EventType::ABSOLUTE,
                axis_code(axis).0,
                value,
            )),
            InputEvent::Sync => None,
        })
        .collect()
}

/// Strong and weak magnitudes of an FF_RUMBLE effect
pub fn rumble_magnitudes(kind: &FFEffectKind) -> Option<(u16, u16)> {
    match *kind {
        FFEffectKind::Rumble {
            strong_magnitude,
            weak_magnitude,
        } => Some((strong_magnitude, weak_magnitude)),
        _ => None,
    }
}

/// Uploaded rumble effects and the one currently playing
///
/// Every method returns the intensity to apply, if it changed.
#[derive(Debug, Default)]
pub struct RumbleEffects {
    effects: HashMap<i16, (u16, u16)>,
    playing: Option<i16>,
}

impl RumbleEffects {
    pub fn upload(&mut self, id: i16, magnitudes: Option<(u16, u16)>) -> Option<(u16, u16)> {
        match magnitudes {
            Some(magnitudes) => {
                self.effects.insert(id, magnitudes);
                // updating the playing effect takes effect immediately
                (self.playing == Some(id)).then_some(magnitudes)
            }
            None => self.erase(id),
        }
    }

    pub fn erase(&mut self, id: i16) -> Option<(u16, u16)> {
        self.effects.remove(&id);
        self.stop(id)
    }

    /// EV_FF playback: a nonzero count starts the effect, zero stops it
    pub fn play(&mut self, id: i16, count: i32) -> Option<(u16, u16)> {
        if count == 0 {
            return self.stop(id);
        }
        let magnitudes = *self.effects.get(&id)?;
        self.playing = Some(id);
        Some(magnitudes)
    }

    fn stop(&mut self, id: i16) -> Option<(u16, u16)> {
        if self.playing != Some(id) {
            return None;
        }
        self.playing = None;
        Some((0, 0))
    }
}

/// Virtual gamepad backed by uinput
pub struct VirtualGamepad {
    device: Arc<Mutex<VirtualDevice>>,
    ff_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl VirtualGamepad {
    /// Create a gamepad exposing everything in `descriptor`
    ///
    /// # Arguments
    /// * `name` - Device name (shown in `evtest` and game controller settings)
    /// * `product_id` - USB product id reported in the input id
    /// * `rumble` - Receiver of effect playback; FF_RUMBLE is only advertised
    ///   when the descriptor asks for it and a receiver is given
    pub fn new(
        name: &str,
        product_id: u16,
        descriptor: &SinkDescriptor,
        rumble: Option<RumbleHandler>,
    ) -> Result<Self, SinkError> {
        let mut keys = AttributeSet::<Key>::new();
        for &button in &descriptor.buttons {
            keys.insert(button_code(button));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(SinkError::Create)?
            .name(name)
            .input_id(InputId::new(
                BusType::BUS_USB,
                switch2_protocol::VENDOR_ID,
                product_id,
                0,
            ))
            .with_keys(&keys)
            .map_err(SinkError::Create)?;

        for setup in &descriptor.axes {
            let abs_setup = UinputAbsSetup::new(
                axis_code(setup.axis),
                AbsInfo::new(0, setup.min, setup.max, setup.fuzz, setup.flat, 0),
            );
            builder = builder
                .with_absolute_axis(&abs_setup)
                .map_err(SinkError::Create)?;
        }

        let rumble = rumble.filter(|_| descriptor.force_feedback);
        if rumble.is_some() {
            let mut ff = AttributeSet::<FFEffectType>::new();
            ff.insert(FFEffectType::FF_RUMBLE);
            builder = builder
                .with_ff(&ff)
                .map_err(SinkError::Create)?
                .with_ff_effects_max(MAX_EFFECTS);
        }

        let mut device = builder.build().map_err(SinkError::Create)?;
        match device.enumerate_dev_nodes_blocking() {
            Ok(mut nodes) => {
                if let Some(Ok(path)) = nodes.next() {
                    info!("Created virtual gamepad {} at {}", name, path.display());
                }
            }
            Err(e) => debug!("Could not enumerate gamepad nodes: {}", e),
        }

        let fd = device.as_raw_fd();
        let device = Arc::new(Mutex::new(device));
        let shutdown = Arc::new(AtomicBool::new(false));
        let ff_thread = match rumble {
            Some(handler) => {
                let device = Arc::clone(&device);
                let shutdown = Arc::clone(&shutdown);
                let handle = std::thread::Builder::new()
                    .name("uinput-ff".to_string())
                    .spawn(move || run_ff_loop(device, fd, handler, shutdown))
                    .map_err(SinkError::Create)?;
                Some(handle)
            }
            None => None,
        };

        Ok(Self {
            device,
            ff_thread,
            shutdown,
        })
    }

    pub fn has_force_feedback(&self) -> bool {
        self.ff_thread.is_some()
    }
}

impl Drop for VirtualGamepad {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.ff_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Wait up to `FF_POLL_MS` for the uinput fd to become readable
fn wait_readable(fd: RawFd) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let result = unsafe { libc::poll(&mut pollfd, 1, FF_POLL_MS) };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(result > 0)
}

/// Serve effect uploads and erasures, and forward playback to `handler`
fn run_ff_loop(
    device: Arc<Mutex<VirtualDevice>>,
    fd: RawFd,
    handler: RumbleHandler,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Force feedback thread started");
    let mut effects = RumbleEffects::default();

    while !shutdown.load(Ordering::Relaxed) {
        match wait_readable(fd) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("uinput poll failed: {}", e);
                break;
            }
        }

        let mut guard = device.lock();
        let events: Vec<evdev::uinput::UInputEvent> = match guard.fetch_events() {
            Ok(events) => events.collect(),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                warn!("uinput read failed: {}", e);
                continue;
            }
        };

        for event in events {
            let change = match event.kind() {
                InputEventKind::UInput(code) if code == UInputEventType::UI_FF_UPLOAD.0 => {
                    match guard.process_ff_upload(event) {
                        Ok(mut upload) => {
                            let id = upload.effect_id();
                            let magnitudes = rumble_magnitudes(&upload.effect().kind);
                            trace!(id, ?magnitudes, "Effect uploaded");
                            upload.set_retval(0);
                            effects.upload(id, magnitudes)
                        }
                        Err(e) => {
                            warn!("Effect upload failed: {}", e);
                            None
                        }
                    }
                }
                InputEventKind::UInput(code) if code == UInputEventType::UI_FF_ERASE.0 => {
                    match guard.process_ff_erase(event) {
                        Ok(erase) => effects.erase(erase.effect_id() as i16),
                        Err(e) => {
                            warn!("Effect erase failed: {}", e);
                            None
                        }
                    }
                }
                InputEventKind::ForceFeedback(id) => effects.play(id as i16, event.value()),
                _ => None,
            };
            if let Some((strong, weak)) = change {
                handler(strong, weak);
            }
        }
    }

    debug!("Force feedback thread exiting");
}

impl InputSink for VirtualGamepad {
    fn emit(&self, events: &[InputEvent]) -> Result<(), SinkError> {
        let events = to_evdev(events);
        if events.is_empty() {
            return Ok(());
        }
        self.device.lock().emit(&events).map_err(SinkError::Emit)
    }
}

/// Sink that drops everything, for commands that only need init to run
pub struct DiscardSink;

impl InputSink for DiscardSink {
    fn emit(&self, _events: &[InputEvent]) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch2_protocol::{sink_descriptor, ControllerType};

    #[test]
    fn test_sync_dropped() {
        let events = to_evdev(&[
            InputEvent::Button {
                button: Button::South,
                pressed: true,
            },
            InputEvent::Axis {
                axis: Axis::Hat0Y,
                value: -1,
            },
            InputEvent::Sync,
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code(), Key::BTN_SOUTH.code());
        assert_eq!(events[0].value(), 1);
        assert_eq!(events[1].code(), AbsoluteAxisType::ABS_HAT0Y.0);
        assert_eq!(events[1].value(), -1);
    }

    #[test]
    fn test_grip_codes() {
        assert_eq!(button_code(Button::GripL).code(), 0x224);
        assert_eq!(button_code(Button::GripR).code(), 0x225);
    }

    #[test]
    #[ignore] // Requires uinput access (run with: cargo test -- --ignored)
    fn test_create_gamepad() {
        let descriptor = sink_descriptor(ControllerType::ProController, "TEST", false);
        let gamepad = VirtualGamepad::new("Test Gamepad", 0x2069, &descriptor, None);
        assert!(gamepad.is_ok());
    }

    #[test]
    #[ignore] // Requires uinput access (run with: cargo test -- --ignored)
    fn test_create_gamepad_with_rumble() {
        let descriptor = sink_descriptor(ControllerType::ProController, "TEST", true);
        let gamepad =
            VirtualGamepad::new("Test Gamepad", 0x2069, &descriptor, Some(Box::new(|_, _| {})))
                .unwrap();
        assert!(gamepad.has_force_feedback());
    }
}
