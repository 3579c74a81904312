//! Bulk command path over nusb
//!
//! Commands are queued to a writer task that owns the OUT endpoint; a reader
//! task keeps one IN transfer pending and hands every frame to the session.

use std::sync::Weak;
use std::time::Duration;

use nusb::transfer::{EndpointType, RequestBuffer, TransferError};
use nusb::Interface;
use parking_lot::Mutex;
use switch2_protocol::device_registry::COMMAND_INTERFACE_CLASS;
use switch2_protocol::{encode_command, CommandPath, ControllerSession, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::ControllerDevice;
use crate::error::DriverError;

/// Bulk transfer size of the command interface
pub const PACKET_SIZE: usize = 64;

/// Commands in flight before `send_command` reports back-pressure
pub const QUEUE_DEPTH: usize = 4;

/// Pause after a failed IN transfer before resubmitting
const READ_RETRY: Duration = Duration::from_millis(100);

/// Location of the command interface in the active configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEndpoints {
    pub interface: u8,
    pub endpoint_in: u8,
    pub endpoint_out: u8,
}

/// Pick the first bulk IN and bulk OUT endpoint from `(address, type)` pairs
pub fn bulk_pair(endpoints: impl IntoIterator<Item = (u8, EndpointType)>) -> Option<(u8, u8)> {
    let mut endpoint_in = None;
    let mut endpoint_out = None;
    for (address, transfer_type) in endpoints {
        if transfer_type != EndpointType::Bulk {
            continue;
        }
        let slot = if address & 0x80 != 0 {
            &mut endpoint_in
        } else {
            &mut endpoint_out
        };
        slot.get_or_insert(address);
    }
    Some((endpoint_in?, endpoint_out?))
}

/// Find the vendor-class interface carrying bulk IN and OUT endpoints
pub fn find_command_endpoints(
    device: &nusb::Device,
) -> Result<Option<CommandEndpoints>, DriverError> {
    let config = device
        .active_configuration()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    for group in config.interfaces() {
        for alt in group.alt_settings() {
            if alt.class() != COMMAND_INTERFACE_CLASS {
                continue;
            }
            let pair = bulk_pair(alt.endpoints().map(|ep| (ep.address(), ep.transfer_type())));
            if let Some((endpoint_in, endpoint_out)) = pair {
                return Ok(Some(CommandEndpoints {
                    interface: alt.interface_number(),
                    endpoint_in,
                    endpoint_out,
                }));
            }
        }
    }
    Ok(None)
}

/// Command path of one controller
pub struct UsbCommandPath {
    interface: Interface,
    endpoints: CommandEndpoints,
    queue: mpsc::Sender<Vec<u8>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UsbCommandPath {
    /// Claim the command interface and start the writer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(device: &ControllerDevice) -> Result<Self, DriverError> {
        let usb = device.usb.open()?;
        let endpoints = find_command_endpoints(&usb)?
            .ok_or_else(|| DriverError::NoCommandInterface(device.name()))?;
        let interface = usb.detach_and_claim_interface(endpoints.interface)?;
        info!(
            "Claimed command interface {} on {} (in {:#04x}, out {:#04x})",
            endpoints.interface,
            device.name(),
            endpoints.endpoint_in,
            endpoints.endpoint_out
        );

        let (queue, frames) = mpsc::channel(QUEUE_DEPTH);
        let writer = tokio::spawn(write_loop(
            interface.clone(),
            endpoints.endpoint_out,
            frames,
        ));

        Ok(Self {
            interface,
            endpoints,
            queue,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(None),
        })
    }

    pub fn endpoints(&self) -> CommandEndpoints {
        self.endpoints
    }

    /// Start delivering inbound frames to `session`
    ///
    /// The reader holds the session weakly and exits once it is gone.
    pub fn start_reader(&self, session: Weak<ControllerSession>) {
        let handle = tokio::spawn(read_loop(
            self.interface.clone(),
            self.endpoints.endpoint_in,
            session,
        ));
        if let Some(old) = self.reader.lock().replace(handle) {
            old.abort();
        }
    }

    /// Stop both tasks, cancelling the pending transfers
    pub async fn shutdown(&self) {
        let tasks = [self.reader.lock().take(), self.writer.lock().take()];
        for task in tasks.into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl CommandPath for UsbCommandPath {
    fn send_command(
        &self,
        command: u8,
        subcommand: u8,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let frame = encode_command(command, subcommand, payload)?;
        self.queue.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::SubmissionFailed("command queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }
}

impl Drop for UsbCommandPath {
    fn drop(&mut self) {
        for task in [self.reader.get_mut().take(), self.writer.get_mut().take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

async fn write_loop(interface: Interface, endpoint: u8, mut frames: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = frames.recv().await {
        debug!("USB Write {:02X?}", frame);
        match interface.bulk_out(endpoint, frame).await.into_result() {
            Ok(_) => {}
            Err(TransferError::Disconnected) => {
                debug!("Command interface disconnected, writer exiting");
                break;
            }
            Err(e) => warn!("Command write failed: {}", e),
        }
    }
}

async fn read_loop(interface: Interface, endpoint: u8, session: Weak<ControllerSession>) {
    loop {
        let completion = interface
            .bulk_in(endpoint, RequestBuffer::new(PACKET_SIZE))
            .await;
        match completion.into_result() {
            Ok(data) => {
                debug!("USB Read {:02X?}", data);
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(e) = session.receive_command(&data) {
                    debug!("Dropped command frame: {}", e);
                }
            }
            Err(TransferError::Cancelled) | Err(TransferError::Disconnected) => {
                debug!("Command interface closed, reader exiting");
                break;
            }
            Err(e) => {
                warn!("Command read failed: {}", e);
                tokio::time::sleep(READ_RETRY).await;
            }
        }
    }
}
