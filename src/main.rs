//! vjoy-remap - Dry Run Application
//!
//! Loads a configuration and runs the full remapping pipeline against the
//! in-memory driver and device source, feeding a short scripted sequence of
//! input events. Useful to check a configuration without the native driver.
//!
//! Usage: vjoy-remap [config.toml]

use anyhow::Context;
use env_logger::Env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vjoy_remap::device::MockDeviceSource;
use vjoy_remap::driver::mock_driver::{MockDriver, MockSlot};
use vjoy_remap::mapping::config::Config;
use vjoy_remap::{HatDirection, InputEvent, RemapManager};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::load_default().context("loading configs/default.toml")?,
    };

    // Initialize logging
    let default_level = config.settings.log_level.as_str();
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    println!("=== vjoy-remap (dry run) ===");
    println!();
    println!("Using the mock driver: no real virtual joystick is touched.");
    println!();

    let driver = Arc::new(MockDriver::new());
    let mut source = MockDeviceSource::new();
    for slot in config.slots() {
        // Distinct button counts keep the slot signatures unique
        driver.add_slot(slot, MockSlot::new(8, 8 + slot, 1));
        source = source.with_virtual(8, 8 + slot, 1);
    }
    for name in bound_device_names(&config) {
        source = source.with_physical(0x044F, 0xB10A, &name, 4, 16, 1);
    }

    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source))?;
    manager.start()?;

    let Some(device) = bound_device_names(manager.config()).into_iter().next() else {
        println!("Configuration has no bindings, nothing to do");
        return Ok(());
    };

    println!("Feeding scripted events for '{}'...", device);
    for raw in [0.0, 16384.0, 32767.0, 49151.0, 65535.0] {
        manager.send_event(InputEvent::AxisMoved { device: device.clone(), axis: 1, raw })?;
        manager.send_event(InputEvent::AxisMoved { device: device.clone(), axis: 4, raw })?;
    }
    manager.send_event(InputEvent::ButtonChanged {
        device: device.clone(),
        button: 1,
        pressed: true,
    })?;
    manager.send_event(InputEvent::HatChanged {
        device: device.clone(),
        hat: 1,
        direction: HatDirection::NORTH_EAST,
    })?;
    manager.send_event(InputEvent::ButtonChanged { device, button: 1, pressed: false })?;

    thread::sleep(Duration::from_millis(200));
    manager.stop();

    println!();
    println!("Driver calls recorded: {}", driver.calls().len());
    Ok(())
}

/// Distinct input device names in binding order
fn bound_device_names(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let all = config
        .axes
        .iter()
        .map(|b| &b.device)
        .chain(config.axis_buttons.iter().map(|b| &b.device))
        .chain(config.buttons.iter().map(|b| &b.device))
        .chain(config.hats.iter().map(|b| &b.device));
    for name in all {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}
