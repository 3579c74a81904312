//! CLI command handlers

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use switch2_protocol::calibration::{StickCalibration, StickSlot};
use switch2_protocol::{SessionInfo, SessionRegistry};
use tracing::info;

use switch2_driver::config::DriverConfig;
use switch2_driver::daemon::{wait_for_init, BoundController, Daemon};
use switch2_driver::discovery::{find_controller, list_controllers};
use switch2_driver::hid::SinkMode;

/// Run the driver daemon
pub async fn run(config: DriverConfig) -> Result<()> {
    Daemon::new(config).run().await
}

/// Print connected controllers
pub fn list() -> Result<()> {
    let controllers = list_controllers()?;
    if controllers.is_empty() {
        println!("No controllers found");
        return Ok(());
    }

    println!("Found {} controller(s):", controllers.len());
    for c in &controllers {
        let hidraw = c
            .hidraw
            .as_ref()
            .map(|node| node.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<8} {:<22} {:04x}  bus {:03} addr {:03}  {}  {}",
            c.name(),
            c.product(),
            c.product_id,
            c.bus_number,
            c.device_address,
            hidraw,
            c.physical_path.display()
        );
    }
    Ok(())
}

/// Bind one controller with a discarding sink and wait for initialization
async fn connect_one(
    config: &DriverConfig,
    registry: &SessionRegistry,
    selector: Option<&str>,
    timeout: Duration,
) -> Result<BoundController> {
    let device = find_controller(selector)?;
    info!("Connecting to {} ({})", device.name(), device.product());
    let bound = BoundController::connect(registry, device, config, &SinkMode::Discard)?;
    if let Err(e) = wait_for_init(&bound.session, timeout).await {
        bound.release(registry).await;
        return Err(e.into());
    }
    Ok(bound)
}

/// Initialize one controller and print what was read from it
pub async fn info(config: &DriverConfig, selector: Option<&str>, timeout_ms: u64) -> Result<()> {
    let registry = SessionRegistry::new();
    let bound = connect_one(
        config,
        &registry,
        selector,
        Duration::from_millis(timeout_ms),
    )
    .await?;
    print_info(&bound.session.info());
    bound.release(&registry).await;
    Ok(())
}

fn print_info(info: &SessionInfo) {
    println!("Controller:  {}", info.controller_type);
    println!("Path:        {}", info.physical_path);
    println!(
        "Serial:      {}",
        if info.serial.is_empty() {
            "(none)"
        } else {
            info.serial.as_str()
        }
    );
    match info.version {
        Some(version) => println!("Firmware:    {}", version),
        None => println!("Firmware:    (unknown)"),
    }
    if let Some(player) = info.player_id {
        println!("Player:      {}", player);
    }

    println!();
    println!("Calibration:");
    for (slot, name) in info.calibration.sticks.iter().zip(["Left stick", "Right stick"]) {
        println!("  {:<12} {}", name, describe_slot(slot));
    }
    match info.calibration.triggers {
        Some(zero) => println!("  {:<12} zero L {} R {}", "Triggers", zero.left, zero.right),
        None => println!("  {:<12} (not read)", "Triggers"),
    }
}

fn describe_stick(calib: &StickCalibration) -> String {
    format!(
        "X {}/-{}/+{}  Y {}/-{}/+{}",
        calib.x.neutral,
        calib.x.negative,
        calib.x.positive,
        calib.y.neutral,
        calib.y.negative,
        calib.y.positive
    )
}

fn describe_slot(slot: &StickSlot) -> String {
    match (slot.user, slot.factory) {
        (Some(user), _) => format!("{} (user)", describe_stick(&user)),
        (None, Some(factory)) => format!("{} (factory)", describe_stick(&factory)),
        (None, None) => "(none)".to_string(),
    }
}

/// Drive the rumble encoder on one controller for a while
#[cfg(feature = "rumble")]
pub async fn rumble(
    config: &DriverConfig,
    selector: Option<&str>,
    strong: u16,
    weak: u16,
    duration_ms: u64,
) -> Result<()> {
    if !config.rumble {
        bail!("Rumble is disabled in the configuration");
    }
    let registry = SessionRegistry::new();
    let bound = connect_one(config, &registry, selector, Duration::from_secs(3)).await?;

    println!(
        "Rumbling {} (strong {}, weak {}) for {} ms",
        bound.session.controller_type(),
        strong,
        weak,
        duration_ms
    );
    bound.session.set_intensity(strong, weak);
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    bound.session.set_intensity(0, 0);
    // let the stop packet go out before the data path closes
    tokio::time::sleep(Duration::from_millis(50)).await;

    bound.release(&registry).await;
    Ok(())
}

#[cfg(not(feature = "rumble"))]
pub async fn rumble(
    _config: &DriverConfig,
    _selector: Option<&str>,
    _strong: u16,
    _weak: u16,
    _duration_ms: u64,
) -> Result<()> {
    bail!("Built without rumble support")
}

/// Print the configuration as TOML
pub fn config_show(config: &DriverConfig, path: &PathBuf) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the configuration file
pub fn config_save(config: &DriverConfig, path: &PathBuf) -> Result<()> {
    config.save(path)?;
    println!("Saved config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch2_protocol::calibration::AxisCalibration;

    fn stick(neutral: u16) -> StickCalibration {
        let axis = AxisCalibration {
            neutral,
            negative: 1200,
            positive: 1300,
        };
        StickCalibration { x: axis, y: axis }
    }

    #[test]
    fn test_describe_slot_prefers_user() {
        let slot = StickSlot {
            factory: Some(stick(2048)),
            user: Some(stick(2000)),
        };
        assert_eq!(
            describe_slot(&slot),
            "X 2000/-1200/+1300  Y 2000/-1200/+1300 (user)"
        );
    }

    #[test]
    fn test_describe_slot_empty() {
        assert_eq!(describe_slot(&StickSlot::default()), "(none)");
    }
}
