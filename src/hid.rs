//! HID data path
//!
//! Input reports are read on a dedicated thread and handed to the session;
//! rumble packets go out through a second handle as output reports.

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use switch2_protocol::{
    ControllerSession, DataPath, InputSink, SinkDescriptor, SinkError, TransportError,
};
use tracing::{debug, trace, warn};

use crate::config::DriverConfig;
use crate::error::{hid_transport_error, DriverError};
use crate::gamepad::{DiscardSink, RumbleHandler, VirtualGamepad};

/// Largest input report the controller sends
const REPORT_SIZE: usize = 64;

/// Sleep duration on read error before retrying
const ERROR_SLEEP: Duration = Duration::from_millis(100);

/// Where decoded input goes once the controller is initialized
#[derive(Debug, Clone)]
pub enum SinkMode {
    /// Expose a uinput gamepad named after the configured device name
    Gamepad(DriverConfig),
    /// Drop input; used by one-shot commands
    Discard,
}

/// Data path of one controller
pub struct HidDataPath {
    product_id: u16,
    sink_mode: SinkMode,
    read_timeout_ms: i32,
    rumble: bool,
    output: Mutex<HidDevice>,
    input: Mutex<Option<HidDevice>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    session: Mutex<Weak<ControllerSession>>,
}

impl HidDataPath {
    /// Open the hidraw node twice: one handle for the reader thread, one for output
    pub fn open(
        api: &HidApi,
        node: &CStr,
        product_id: u16,
        sink_mode: SinkMode,
        config: &DriverConfig,
    ) -> Result<Self, DriverError> {
        let input = api.open_path(node)?;
        let output = api.open_path(node)?;
        debug!("Opened HID data path {:?}", node);
        Ok(Self {
            product_id,
            sink_mode,
            read_timeout_ms: config.read_timeout_ms,
            rumble: config.rumble,
            output: Mutex::new(output),
            input: Mutex::new(Some(input)),
            reader: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(Weak::new()),
        })
    }

    /// Spawn the reader thread feeding `session`
    ///
    /// Only the first call has effect; the input handle moves into the thread.
    pub fn start_reader(&self, session: Weak<ControllerSession>) -> Result<(), DriverError> {
        let Some(input) = self.input.lock().take() else {
            return Ok(());
        };
        *self.session.lock() = session.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let timeout = self.read_timeout_ms;
        let handle = std::thread::Builder::new()
            .name("hid-report-reader".to_string())
            .spawn(move || run_report_reader(input, session, shutdown, timeout))?;
        *self.reader.lock() = Some(handle);
        Ok(())
    }

    /// Route gamepad force feedback to the session's rumble encoder
    ///
    /// Playback arrives on the gamepad's own thread, so the handler carries
    /// the runtime the rumble task is spawned on.
    #[cfg(feature = "rumble")]
    fn rumble_handler(&self) -> Option<RumbleHandler> {
        if !self.rumble {
            return None;
        }
        let session = self.session.lock().clone();
        let runtime = tokio::runtime::Handle::try_current()
            .inspect_err(|e| warn!("No runtime for force feedback: {}", e))
            .ok()?;
        Some(Box::new(move |strong, weak| {
            if let Some(session) = session.upgrade() {
                let _guard = runtime.enter();
                session.set_intensity(strong, weak);
            }
        }))
    }

    #[cfg(not(feature = "rumble"))]
    fn rumble_handler(&self) -> Option<RumbleHandler> {
        None
    }

    /// Signal the reader thread to exit; it notices within one read timeout
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.reader.lock().take();
    }
}

impl Drop for HidDataPath {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl DataPath for HidDataPath {
    fn open_sink(&self, descriptor: &SinkDescriptor) -> Result<Arc<dyn InputSink>, SinkError> {
        match &self.sink_mode {
            SinkMode::Gamepad(config) => {
                let name = config.gamepad_name(descriptor.controller_type.name());
                let gamepad = VirtualGamepad::new(
                    &name,
                    self.product_id,
                    descriptor,
                    self.rumble_handler(),
                )?;
                Ok(Arc::new(gamepad))
            }
            SinkMode::Discard => Ok(Arc::new(DiscardSink)),
        }
    }

    fn write_output_report(&self, report: &[u8]) -> Result<(), TransportError> {
        if !self.rumble {
            return Ok(());
        }
        trace!("HID Write {:02x?}", &report[..report.len().min(16)]);
        self.output
            .lock()
            .write(report)
            .map(|_| ())
            .map_err(hid_transport_error)
    }
}

fn run_report_reader(
    input: HidDevice,
    session: Weak<ControllerSession>,
    shutdown: Arc<AtomicBool>,
    read_timeout_ms: i32,
) {
    debug!("HID report reader thread started");
    let mut buf = [0u8; REPORT_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        match input.read_timeout(&mut buf, read_timeout_ms) {
            Ok(len) if len > 0 => {
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(e) = session.receive_report(&buf[..len]) {
                    trace!("Dropped report: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("HID report reader error: {}", e);
                std::thread::sleep(ERROR_SLEEP);
            }
        }
    }

    debug!("HID report reader thread exiting");
}
