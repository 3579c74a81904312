//! Driver daemon
//!
//! Keeps the set of bound controllers in step with what is plugged in.
//! Each controller gets a session in the registry; its command and data
//! paths attach independently as they become available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hidapi::HidApi;
use switch2_protocol::{CommandPath, ControllerSession, DataPath, SessionRegistry};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::discovery::{list_controllers, ControllerDevice, HotplugEvent};
use crate::error::DriverError;
use crate::hid::{HidDataPath, SinkMode};
use crate::usb::UsbCommandPath;

#[cfg(feature = "hotplug")]
use crate::discovery::HotplugMonitor;

/// Delay before rescanning after a USB add event
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Poll interval while waiting for initialization
const INIT_POLL: Duration = Duration::from_millis(20);

/// A controller with its transports
pub struct BoundController {
    pub device: ControllerDevice,
    pub session: Arc<ControllerSession>,
    usb: Option<Arc<UsbCommandPath>>,
    hid: Option<Arc<HidDataPath>>,
}

impl BoundController {
    /// Open whichever paths are available and attach them to the registry
    ///
    /// A controller with neither path usable is an error; one missing path
    /// is retried by `complete` on a later rescan.
    pub fn connect(
        registry: &SessionRegistry,
        device: ControllerDevice,
        config: &DriverConfig,
        sink_mode: &SinkMode,
    ) -> Result<Self, DriverError> {
        let usb = UsbCommandPath::open(&device);
        let hid = open_hid(&device, config, sink_mode);
        let (usb, hid) = match (usb, hid) {
            (Err(e), Err(hid_err)) => {
                debug!("{}: data path unavailable: {}", device.name(), hid_err);
                return Err(e);
            }
            (usb, hid) => (
                usb.inspect_err(|e| warn!("{}: command path unavailable: {}", device.name(), e))
                    .ok(),
                hid.inspect_err(|e| debug!("{}: data path unavailable: {}", device.name(), e))
                    .ok(),
            ),
        };

        let mut bound = Self {
            session: registry.acquire(&device.key()),
            device,
            usb: None,
            hid: None,
        };
        if let Some(usb) = usb {
            bound.bind_usb(registry, Arc::new(usb));
        }
        if let Some(hid) = hid {
            if let Err(e) = bound.bind_hid(registry, Arc::new(hid)) {
                warn!("{}: report reader failed to start: {}", bound.device.name(), e);
            }
        }
        Ok(bound)
    }

    fn bind_usb(&mut self, registry: &SessionRegistry, usb: Arc<UsbCommandPath>) {
        usb.start_reader(Arc::downgrade(&self.session));
        let path: Arc<dyn CommandPath> = usb.clone();
        registry.attach_command_path(&self.device.key(), path);
        self.usb = Some(usb);
    }

    fn bind_hid(
        &mut self,
        registry: &SessionRegistry,
        hid: Arc<HidDataPath>,
    ) -> Result<(), DriverError> {
        hid.start_reader(Arc::downgrade(&self.session))?;
        let path: Arc<dyn DataPath> = hid.clone();
        registry.attach_data_path(&self.device.key(), path);
        self.hid = Some(hid);
        Ok(())
    }

    /// Attach paths that were missing on a previous attempt
    pub fn complete(
        &mut self,
        registry: &SessionRegistry,
        device: ControllerDevice,
        config: &DriverConfig,
        sink_mode: &SinkMode,
    ) {
        if self.device.hidraw.is_none() {
            self.device.hidraw = device.hidraw;
        }
        if self.usb.is_none() {
            match UsbCommandPath::open(&self.device) {
                Ok(usb) => self.bind_usb(registry, Arc::new(usb)),
                Err(e) => debug!("{}: command path still unavailable: {}", self.device.name(), e),
            }
        }
        if self.hid.is_none() && self.device.hidraw.is_some() {
            let result = open_hid(&self.device, config, sink_mode)
                .and_then(|hid| self.bind_hid(registry, Arc::new(hid)));
            if let Err(e) = result {
                debug!("{}: data path still unavailable: {}", self.device.name(), e);
            }
        }
    }

    /// Whether one of the two paths is still missing
    pub fn is_partial(&self) -> bool {
        self.usb.is_none() || self.hid.is_none()
    }

    /// Stop both transports and release them from the registry
    pub async fn release(self, registry: &SessionRegistry) {
        if let Some(usb) = self.usb {
            usb.shutdown().await;
            registry.release_command_path(&self.session).await;
        }
        if let Some(hid) = self.hid {
            hid.shutdown();
            registry.release_data_path(&self.session).await;
        }
        info!("{}: released", self.device.name());
    }
}

fn open_hid(
    device: &ControllerDevice,
    config: &DriverConfig,
    sink_mode: &SinkMode,
) -> Result<HidDataPath, DriverError> {
    let node = device
        .hidraw
        .as_deref()
        .ok_or_else(|| DriverError::NoHidInterface(device.name()))?;
    let api = HidApi::new()?;
    HidDataPath::open(
        &api,
        node,
        device.product_id,
        sink_mode.clone(),
        config,
    )
}

/// Wait until the session has finished initialization
pub async fn wait_for_init(
    session: &ControllerSession,
    timeout: Duration,
) -> Result<(), DriverError> {
    let deadline = Instant::now() + timeout;
    while !session.init_step().is_done() {
        if Instant::now() >= deadline {
            return Err(DriverError::Timeout("controller initialization"));
        }
        sleep(INIT_POLL).await;
    }
    Ok(())
}

/// Bound controllers, keyed by physical path
pub struct Daemon {
    config: DriverConfig,
    sink_mode: SinkMode,
    registry: Arc<SessionRegistry>,
    bound: HashMap<PathBuf, BoundController>,
}

impl Daemon {
    pub fn new(config: DriverConfig) -> Self {
        let sink_mode = SinkMode::Gamepad(config.clone());
        Self {
            config,
            sink_mode,
            registry: Arc::new(SessionRegistry::new()),
            bound: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind new controllers, complete partial ones and drop vanished ones
    pub async fn rescan(&mut self) {
        let devices = match list_controllers() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Controller enumeration failed: {}", e);
                return;
            }
        };

        let present: Vec<PathBuf> = devices.iter().map(|d| d.physical_path.clone()).collect();
        let gone: Vec<PathBuf> = self
            .bound
            .keys()
            .filter(|path| !present.contains(path))
            .cloned()
            .collect();
        for path in gone {
            self.unbind(&path).await;
        }

        for device in devices {
            match self.bound.get_mut(&device.physical_path) {
                Some(bound) => {
                    if bound.is_partial() {
                        bound.complete(&self.registry, device, &self.config, &self.sink_mode);
                    }
                }
                None => self.bind(device),
            }
        }
    }

    fn bind(&mut self, device: ControllerDevice) {
        let name = device.name();
        let path = device.physical_path.clone();
        info!(
            "{}: {} on bus {} addr {}",
            name,
            device.product(),
            device.bus_number,
            device.device_address
        );
        match BoundController::connect(&self.registry, device, &self.config, &self.sink_mode) {
            Ok(bound) => {
                self.bound.insert(path, bound);
            }
            Err(e) => warn!("{}: failed to bind: {}", name, e),
        }
    }

    async fn unbind(&mut self, path: &Path) {
        if let Some(bound) = self.bound.remove(path) {
            bound.release(&self.registry).await;
        }
    }

    fn has_partial(&self) -> bool {
        self.bound.values().any(BoundController::is_partial)
    }

    async fn handle_hotplug(&mut self, event: HotplugEvent) {
        match event {
            HotplugEvent::Added(path) => {
                debug!("USB add {}", path.display());
                sleep(SETTLE_DELAY).await;
                self.rescan().await;
            }
            HotplugEvent::Removed(path) => {
                let path = path.canonicalize().unwrap_or(path);
                if self.bound.contains_key(&path) {
                    debug!("USB remove {}", path.display());
                    self.unbind(&path).await;
                }
            }
        }
    }

    /// Run until interrupted
    pub async fn run(mut self) -> anyhow::Result<()> {
        #[cfg(feature = "hotplug")]
        let mut monitor = if self.config.hotplug {
            match HotplugMonitor::new() {
                Ok(monitor) => Some(monitor),
                Err(e) => {
                    warn!("Hotplug unavailable, polling instead: {}", e);
                    None
                }
            }
        } else {
            None
        };
        #[cfg(not(feature = "hotplug"))]
        let mut monitor: Option<NoMonitor> = None;

        self.rescan().await;
        if self.bound.is_empty() {
            info!("No controller connected, waiting");
        }

        let mut tick = interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("Driver running. Press Ctrl+C to exit.");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                event = next_hotplug(&mut monitor) => {
                    match event {
                        Some(event) => self.handle_hotplug(event).await,
                        None => {
                            warn!("Hotplug monitor closed, polling instead");
                            monitor = None;
                        }
                    }
                }
                _ = tick.tick() => {
                    if monitor.is_none() || self.has_partial() {
                        self.rescan().await;
                    }
                }
            }
        }

        let paths: Vec<PathBuf> = self.bound.keys().cloned().collect();
        for path in paths {
            self.unbind(&path).await;
        }
        Ok(())
    }
}

#[cfg(feature = "hotplug")]
async fn next_hotplug(monitor: &mut Option<HotplugMonitor>) -> Option<HotplugEvent> {
    match monitor {
        Some(monitor) => monitor.next_event().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(feature = "hotplug"))]
enum NoMonitor {}

#[cfg(not(feature = "hotplug"))]
async fn next_hotplug(monitor: &mut Option<NoMonitor>) -> Option<HotplugEvent> {
    match monitor {
        Some(never) => match *never {},
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_init_times_out() {
        let session = ControllerSession::new("/sys/devices/test/1-1");
        let result = wait_for_init(&session, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(DriverError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_daemon_starts_empty() {
        let daemon = Daemon::new(DriverConfig::default());
        assert!(daemon.registry().is_empty());
        assert!(!daemon.has_partial());
    }
}
