//! Rumble waveform encoding and the periodic emission task
//!
//! GameCube controllers drive an on/off motor, so intensity is approximated
//! by error diffusion over successive packets. Every other controller takes
//! an HD waveform (two frequency/amplitude pairs, 10 bits each) which the
//! Pro Controller receives twice, once per actuator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::protocol::rumble;
use crate::types::ControllerType;
use crate::DataPath;

/// Size of one rumble output report
pub const PACKET_SIZE: usize = 64;

/// HD rumble waveform parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdRumble {
    pub hi_freq: u16,
    pub hi_amp: u16,
    pub lo_freq: u16,
    pub lo_amp: u16,
}

impl Default for HdRumble {
    fn default() -> Self {
        Self {
            hi_freq: rumble::HI_FREQ,
            hi_amp: 0,
            lo_freq: rumble::LO_FREQ,
            lo_amp: 0,
        }
    }
}

impl HdRumble {
    /// Pack the four 10-bit fields into five bytes
    pub fn encode(&self) -> [u8; 5] {
        let hi_freq = self.hi_freq & 0x3FF;
        let hi_amp = self.hi_amp & 0x3FF;
        let lo_freq = self.lo_freq & 0x3FF;
        let lo_amp = self.lo_amp & 0x3FF;
        [
            hi_freq as u8,
            ((hi_freq >> 8) | (hi_amp << 2)) as u8,
            ((hi_amp >> 6) | (lo_freq << 4)) as u8,
            ((lo_freq >> 4) | (lo_amp << 6)) as u8,
            (lo_amp >> 2) as u8,
        ]
    }

    pub fn is_active(&self) -> bool {
        self.hi_amp != 0 || self.lo_amp != 0
    }
}

/// Waveform state, by motor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// On/off motor with accumulated quantization error
    Erm { amplitude: u16, error: u16 },
    Hd(HdRumble),
}

impl Waveform {
    pub fn for_type(controller_type: ControllerType) -> Self {
        if controller_type.is_gamecube() {
            Waveform::Erm {
                amplitude: 0,
                error: 0,
            }
        } else {
            Waveform::Hd(HdRumble::default())
        }
    }
}

/// One emitted packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RumblePacket {
    pub bytes: [u8; PACKET_SIZE],
    /// Whether emission continues after this packet
    pub active: bool,
}

/// Rumble encoder state for one controller
#[derive(Debug, Clone)]
pub struct RumbleState {
    controller_type: ControllerType,
    waveform: Waveform,
    seq: u8,
    /// Deadline baseline of the last emitted packet; `None` while idle
    last_scheduled: Option<Instant>,
}

impl RumbleState {
    pub fn new(controller_type: ControllerType) -> Self {
        Self {
            controller_type,
            waveform: Waveform::for_type(controller_type),
            seq: 0,
            last_scheduled: None,
        }
    }

    pub fn controller_type(&self) -> ControllerType {
        self.controller_type
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn is_active(&self) -> bool {
        self.last_scheduled.is_some()
    }

    /// Switch the packet format once the firmware reports the real type
    pub fn set_controller_type(&mut self, controller_type: ControllerType) {
        if controller_type != self.controller_type {
            self.controller_type = controller_type;
            self.waveform = Waveform::for_type(controller_type);
        }
    }

    /// Map a force-feedback request onto the waveform
    pub fn set_intensity(&mut self, strong: u16, weak: u16) {
        match &mut self.waveform {
            Waveform::Erm { amplitude, .. } => {
                *amplitude = strong.max(weak >> 1);
            }
            Waveform::Hd(hd) => {
                hd.hi_amp = (u32::from(weak) * rumble::MAX_AMPLITUDE >> 16) as u16;
                hd.lo_amp = (u32::from(strong) * rumble::MAX_AMPLITUDE >> 16) as u16;
            }
        }
    }

    /// Build the next packet and advance the sequence counter
    pub fn next_packet(&mut self) -> RumblePacket {
        let mut bytes = [0u8; PACKET_SIZE];
        let header = rumble::SEQ_TAG | self.seq;
        bytes[1] = header;

        let active = match &mut self.waveform {
            Waveform::Erm { amplitude, error } => {
                bytes[0] = rumble::REPORT_GAMECUBE;
                if *amplitude == 0 {
                    bytes[2] = rumble::GC_STOP;
                    *error = 0;
                    false
                } else {
                    if *error < *amplitude {
                        bytes[2] = rumble::GC_ON;
                        *error += u16::MAX - *amplitude;
                    } else {
                        bytes[2] = rumble::GC_OFF;
                        *error -= *amplitude;
                    }
                    true
                }
            }
            Waveform::Hd(hd) => {
                let encoded = hd.encode();
                bytes[2..7].copy_from_slice(&encoded);
                if self.controller_type == ControllerType::ProController {
                    bytes[0] = rumble::REPORT_PRO;
                    let second = rumble::PRO_SECOND_OFFSET;
                    bytes[second] = header;
                    bytes[second + 1..second + 6].copy_from_slice(&encoded);
                } else {
                    bytes[0] = rumble::REPORT_HD;
                }
                hd.is_active()
            }
        };

        self.seq = (self.seq + 1) & 0x0F;
        RumblePacket { bytes, active }
    }

    /// Deadline of the next tick after emitting at `now`
    ///
    /// The baseline accumulates by one interval per tick so jitter in the
    /// wakeups does not add up. Returns `None` and goes idle when inactive.
    pub fn schedule(&mut self, now: Instant, active: bool) -> Option<Instant> {
        if !active {
            self.last_scheduled = None;
            return None;
        }
        let interval = Duration::from_millis(rumble::INTERVAL_MS);
        let baseline = match self.last_scheduled {
            Some(last) => last + interval,
            None => now,
        };
        self.last_scheduled = Some(baseline);
        Some(baseline + interval)
    }

    /// Drop any requested intensity and go idle
    pub fn stop(&mut self) {
        self.waveform = Waveform::for_type(self.controller_type);
        self.last_scheduled = None;
    }
}

/// Owns the rumble state and the task that emits packets from it
pub struct RumbleScheduler {
    state: Arc<Mutex<RumbleState>>,
    kick: Arc<Notify>,
    output: Mutex<Option<Arc<dyn DataPath>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RumbleScheduler {
    pub fn new(controller_type: ControllerType) -> Self {
        Self {
            state: Arc::new(Mutex::new(RumbleState::new(controller_type))),
            kick: Arc::new(Notify::new()),
            output: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Path the packets are written to
    pub fn attach_output(&self, output: Arc<dyn DataPath>) {
        *self.output.lock() = Some(output);
    }

    /// Forget the output path; a running task keeps its own handle until cancelled
    pub fn detach_output(&self) {
        self.output.lock().take();
    }

    /// Snapshot of the encoder state
    pub fn state(&self) -> RumbleState {
        self.state.lock().clone()
    }

    pub fn set_controller_type(&self, controller_type: ControllerType) {
        self.state.lock().set_controller_type(controller_type);
    }

    /// Update intensity and trigger an emission
    ///
    /// From idle a packet goes out immediately; while active the new
    /// intensity is picked up by the next periodic tick. The emission task
    /// is started on first use and needs a tokio runtime. Without an output
    /// path the request is stored but nothing is sent.
    pub fn set_intensity(&self, strong: u16, weak: u16) {
        self.state.lock().set_intensity(strong, weak);

        let mut task = self.task.lock();
        if task.as_ref().map_or(true, JoinHandle::is_finished) {
            let Some(output) = self.output.lock().clone() else {
                debug!("Rumble requested without a data path");
                return;
            };
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Cannot start rumble task: {}", e);
                    return;
                }
            };
            *task = Some(runtime.spawn(emit_loop(
                Arc::clone(&self.state),
                Arc::clone(&self.kick),
                output,
            )));
        }
        drop(task);

        self.kick.notify_one();
    }

    /// Cancel the emission task and wait for it to exit
    ///
    /// The encoder is idle afterwards and the output stays attached, so the
    /// next intensity request starts a fresh task. Safe to call repeatedly.
    pub async fn cancel(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            debug!("Rumble task cancelled");
        }
        self.state.lock().stop();
    }
}

impl Drop for RumbleScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn emit_loop(state: Arc<Mutex<RumbleState>>, kick: Arc<Notify>, output: Arc<dyn DataPath>) {
    let mut deadline: Option<Instant> = None;
    loop {
        match deadline {
            Some(at) => {
                tokio::select! {
                    // already active: the next tick carries the new intensity
                    _ = kick.notified() => continue,
                    _ = sleep_until(at) => {}
                }
            }
            None => kick.notified().await,
        }

        let packet = {
            let mut state = state.lock();
            let packet = state.next_packet();
            deadline = state.schedule(Instant::now(), packet.active);
            packet
        };

        if let Err(e) = output.write_output_report(&packet.bytes) {
            debug!("Rumble packet not sent: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hd_encode_packing() {
        let hd = HdRumble {
            hi_freq: 0x187,
            hi_amp: 0x3FF,
            lo_freq: 0x112,
            lo_amp: 0,
        };
        let bytes = hd.encode();
        assert_eq!(bytes[0], 0x87);
        assert_eq!(bytes[1], 0x01 | 0xFC);
        assert_eq!(bytes[2], 0x0F | 0x20);
        assert_eq!(bytes[3], 0x11);
        assert_eq!(bytes[4], 0x00);
    }

    #[test]
    fn test_hd_intensity_is_ceiled() {
        let mut state = RumbleState::new(ControllerType::ProController);
        state.set_intensity(0xFFFF, 0x8000);
        let Waveform::Hd(hd) = state.waveform() else {
            panic!("expected HD waveform");
        };
        assert_eq!(hd.lo_amp, 449);
        assert_eq!(hd.hi_amp, 225);
        assert!(u32::from(hd.lo_amp) < rumble::MAX_AMPLITUDE);
    }

    #[test]
    fn test_erm_amplitude() {
        let mut state = RumbleState::new(ControllerType::GameCubeController);
        state.set_intensity(100, 1000);
        assert_eq!(
            state.waveform(),
            Waveform::Erm {
                amplitude: 500,
                error: 0
            }
        );
    }

    #[test]
    fn test_erm_duty_cycle_matches_amplitude() {
        let mut state = RumbleState::new(ControllerType::GameCubeController);
        state.set_intensity(0x8000, 0);
        let on = (0..100)
            .map(|_| state.next_packet())
            .filter(|p| p.bytes[2] == rumble::GC_ON)
            .count();
        assert!((49..=51).contains(&on), "on count {on}");
    }

    #[test]
    fn test_erm_stop_packet() {
        let mut state = RumbleState::new(ControllerType::GameCubeController);
        let packet = state.next_packet();
        assert_eq!(packet.bytes[0], rumble::REPORT_GAMECUBE);
        assert_eq!(packet.bytes[2], rumble::GC_STOP);
        assert!(!packet.active);
    }

    #[test]
    fn test_pro_packet_has_two_halves() {
        let mut state = RumbleState::new(ControllerType::ProController);
        state.set_intensity(0x4000, 0x4000);
        let packet = state.next_packet();
        assert_eq!(packet.bytes[0], rumble::REPORT_PRO);
        assert_eq!(packet.bytes[1], 0x50);
        assert_eq!(packet.bytes[0x11], 0x50);
        assert_eq!(packet.bytes[2..7], packet.bytes[0x12..0x17]);
        assert!(packet.active);
    }

    #[test]
    fn test_joycon_packet_single_half() {
        let mut state = RumbleState::new(ControllerType::LeftJoycon);
        state.set_intensity(0x4000, 0);
        let packet = state.next_packet();
        assert_eq!(packet.bytes[0], rumble::REPORT_HD);
        assert!(packet.bytes[0x11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sequence_wraps() {
        let mut state = RumbleState::new(ControllerType::RightJoycon);
        for expected in (0..16).chain(0..4) {
            let packet = state.next_packet();
            assert_eq!(packet.bytes[1], 0x50 | expected);
        }
    }

    #[test]
    fn test_schedule_accumulates() {
        let mut state = RumbleState::new(ControllerType::ProController);
        let start = Instant::now();
        let interval = Duration::from_millis(rumble::INTERVAL_MS);

        assert_eq!(state.schedule(start, true), Some(start + interval));
        // late wakeup does not push the cadence back
        let late = start + interval + Duration::from_millis(3);
        assert_eq!(state.schedule(late, true), Some(start + interval * 2));
        assert!(state.is_active());

        assert_eq!(state.schedule(late, false), None);
        assert!(!state.is_active());
        let restart = late + Duration::from_millis(100);
        assert_eq!(state.schedule(restart, true), Some(restart + interval));
    }

    #[test]
    fn test_type_change_resets_waveform() {
        let mut state = RumbleState::new(ControllerType::LeftJoycon);
        state.set_intensity(0xFFFF, 0xFFFF);
        state.set_controller_type(ControllerType::GameCubeController);
        assert_eq!(
            state.waveform(),
            Waveform::Erm {
                amplitude: 0,
                error: 0
            }
        );
    }
}
