//! Routes physical input events to virtual device controls

use crate::driver::DriverError;
use crate::mapping::axis_button::AxisButton;
use crate::mapping::config::{Config, InputEvent};
use crate::transform::{Calibration, InputRangeError};
use crate::vjoy::{HatDirection, VirtualDevice};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Binding references virtual device {slot}, which is not acquired")]
    MissingDevice { slot: u32 },

    #[error("Invalid range in binding: {0}")]
    Range(#[from] InputRangeError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Routes keyed by device name, then 1-based input index
type Routes<T> = HashMap<String, HashMap<u32, Vec<T>>>;

fn add_route<T>(routes: &mut Routes<T>, device: &str, input: u32, route: T) {
    routes
        .entry(device.to_string())
        .or_default()
        .entry(input)
        .or_default()
        .push(route);
}

#[derive(Debug, Clone, Copy)]
struct Target {
    slot: u32,
    output: u32,
}

#[derive(Debug)]
struct AxisRoute {
    calibration: Option<Calibration>,
    target: Target,
}

#[derive(Debug)]
struct AxisButtonRoute {
    calibration: Option<Calibration>,
    detector: AxisButton,
    target: Target,
}

/// Applies the configured bindings to incoming events.
///
/// Owns the virtual devices for the duration of a run. Write failures are
/// logged and not retried.
pub struct MappingExecutor {
    devices: BTreeMap<u32, VirtualDevice>,
    axes: Routes<AxisRoute>,
    axis_buttons: Routes<AxisButtonRoute>,
    buttons: Routes<Target>,
    hats: Routes<Target>,
}

impl MappingExecutor {
    /// Compiles the bindings of `config` against the acquired `devices`.
    ///
    /// Calibrations are selected here once per binding; deadzones and curves
    /// are installed on the target axes.
    pub fn new(
        config: &Config,
        mut devices: BTreeMap<u32, VirtualDevice>,
    ) -> Result<Self, ExecutorError> {
        let mut axes = Routes::new();
        let mut axis_buttons = Routes::new();
        let mut buttons = Routes::new();
        let mut hats = Routes::new();

        for binding in &config.axes {
            let device = devices
                .get_mut(&binding.slot)
                .ok_or(ExecutorError::MissingDevice { slot: binding.slot })?;
            let axis = device.axis_mut(binding.output)?;
            if let Some(deadzone) = &binding.deadzone {
                axis.set_deadzone(deadzone.build()?);
            }
            if let Some(curve) = &binding.curve {
                axis.set_response_curve(curve.build()?);
            }

            let calibration = binding.calibration.as_ref().map(|c| c.build()).transpose()?;
            add_route(&mut axes, &binding.device, binding.input, AxisRoute {
                calibration,
                target: Target { slot: binding.slot, output: binding.output },
            });
        }

        for binding in &config.axis_buttons {
            check_button(&devices, binding.slot, binding.output)?;
            let calibration = binding.calibration.as_ref().map(|c| c.build()).transpose()?;
            add_route(&mut axis_buttons, &binding.device, binding.input, AxisButtonRoute {
                calibration,
                detector: AxisButton::new(binding.lower, binding.upper),
                target: Target { slot: binding.slot, output: binding.output },
            });
        }

        for binding in &config.buttons {
            check_button(&devices, binding.slot, binding.output)?;
            add_route(&mut buttons, &binding.device, binding.input,
                Target { slot: binding.slot, output: binding.output });
        }

        for binding in &config.hats {
            let device = devices
                .get(&binding.slot)
                .ok_or(ExecutorError::MissingDevice { slot: binding.slot })?;
            device.hat(binding.output)?;
            add_route(&mut hats, &binding.device, binding.input,
                Target { slot: binding.slot, output: binding.output });
        }

        info!(
            "Executor ready: {} devices, {} axis, {} axis-button, {} button, {} hat bindings",
            devices.len(),
            config.axes.len(),
            config.axis_buttons.len(),
            config.buttons.len(),
            config.hats.len()
        );

        Ok(Self { devices, axes, axis_buttons, buttons, hats })
    }

    /// Process an input event and write the bound virtual controls
    pub fn process_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::AxisMoved { device, axis, raw } => {
                self.on_axis_moved(device, *axis, *raw);
            }

            InputEvent::ButtonChanged { device, button, pressed } => {
                self.on_button_changed(device, *button, *pressed);
            }

            InputEvent::HatChanged { device, hat, direction } => {
                self.on_hat_changed(device, *hat, *direction);
            }
        }
    }

    pub fn device(&self, slot: u32) -> Option<&VirtualDevice> {
        self.devices.get(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.devices.keys().copied()
    }

    /// Invalidates every device, stopping their keep-alive timers
    pub fn shutdown(&mut self) {
        for (slot, device) in self.devices.iter_mut() {
            if let Err(e) = device.invalidate() {
                warn!("Failed to cleanly release virtual device {}: {}", slot, e);
            }
        }
    }

    fn on_axis_moved(&mut self, device: &str, axis: u32, raw: f64) {
        let axis_routes = self.axes.get(device).and_then(|m| m.get(&axis));
        let button_routes = self.axis_buttons.get_mut(device).and_then(|m| m.get_mut(&axis));
        if axis_routes.is_none() && button_routes.is_none() {
            trace!("Unbound axis {} on '{}'", axis, device);
            return;
        }

        let devices = &mut self.devices;
        for route in axis_routes.into_iter().flatten() {
            let value = calibrate(route.calibration.as_ref(), raw);
            let result = devices
                .get_mut(&route.target.slot)
                .ok_or(DriverError::Released { slot: route.target.slot })
                .and_then(|d| d.axis_mut(route.target.output))
                .and_then(|a| a.set_value(value));
            if let Err(e) = result {
                warn!("Failed to set axis from '{}' axis {}: {}", device, axis, e);
            }
        }

        for route in button_routes.into_iter().flatten() {
            let value = calibrate(route.calibration.as_ref(), raw);
            let target = route.target;
            route.detector.process(value, |edge| {
                debug!(
                    "Axis {} on '{}' {:?} -> button {} on slot {}",
                    axis, device, edge, target.output, target.slot
                );
                write_button(devices, target, edge.is_pressed());
            });
        }
    }

    fn on_button_changed(&mut self, device: &str, button: u32, pressed: bool) {
        let Some(targets) = self.buttons.get(device).and_then(|m| m.get(&button)) else {
            trace!("Unbound button {} on '{}'", button, device);
            return;
        };

        for target in targets {
            write_button(&mut self.devices, *target, pressed);
        }
    }

    fn on_hat_changed(&mut self, device: &str, hat: u32, direction: HatDirection) {
        let Some(targets) = self.hats.get(device).and_then(|m| m.get(&hat)) else {
            trace!("Unbound hat {} on '{}'", hat, device);
            return;
        };

        for target in targets {
            let result = self
                .devices
                .get_mut(&target.slot)
                .ok_or(DriverError::Released { slot: target.slot })
                .and_then(|d| d.hat_mut(target.output))
                .and_then(|h| h.set_direction(direction));
            if let Err(e) = result {
                warn!("Failed to set hat {} on slot {}: {}", target.output, target.slot, e);
            }
        }
    }
}

impl Drop for MappingExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn calibrate(calibration: Option<&Calibration>, raw: f64) -> f64 {
    calibration.map(|c| c.apply(raw)).unwrap_or(raw)
}

fn check_button(
    devices: &BTreeMap<u32, VirtualDevice>,
    slot: u32,
    output: u32,
) -> Result<(), ExecutorError> {
    let device = devices.get(&slot).ok_or(ExecutorError::MissingDevice { slot })?;
    device.button(output)?;
    Ok(())
}

fn write_button(devices: &mut BTreeMap<u32, VirtualDevice>, target: Target, pressed: bool) {
    let result = devices
        .get_mut(&target.slot)
        .ok_or(DriverError::Released { slot: target.slot })
        .and_then(|d| d.button_mut(target.output))
        .and_then(|b| b.set_pressed(pressed));
    if let Err(e) = result {
        warn!("Failed to set button {} on slot {}: {}", target.output, target.slot, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock_driver::{MockDriver, MockSlot};
    use crate::driver::{DriverHandle, REQUIRED_DRIVER_VERSION};
    use crate::mapping::config::{
        AxisBinding, AxisButtonBinding, ButtonBinding, CalibrationRange, HatBinding,
    };
    use std::sync::Arc;

    fn setup(config: &Config) -> (Arc<MockDriver>, MappingExecutor) {
        let driver = Arc::new(MockDriver::new().with_slot(1, MockSlot::new(4, 8, 1)));
        let handle = DriverHandle::open(driver.clone(), REQUIRED_DRIVER_VERSION).unwrap();
        let mut devices = BTreeMap::new();
        devices.insert(1, VirtualDevice::acquire(&handle, 1).unwrap());
        let executor = MappingExecutor::new(config, devices).unwrap();
        (driver, executor)
    }

    fn config() -> Config {
        Config {
            axes: vec![AxisBinding {
                device: "Stick".into(),
                input: 1,
                slot: 1,
                output: 2,
                calibration: Some(CalibrationRange {
                    minimum: 0.0,
                    center: 500.0,
                    maximum: 1000.0,
                }),
                deadzone: None,
                curve: None,
            }],
            axis_buttons: vec![AxisButtonBinding {
                device: "Stick".into(),
                input: 3,
                calibration: None,
                lower: 0.4,
                upper: 0.6,
                slot: 1,
                output: 5,
            }],
            buttons: vec![ButtonBinding { device: "Stick".into(), input: 1, slot: 1, output: 1 }],
            hats: vec![HatBinding { device: "Stick".into(), input: 1, slot: 1, output: 1 }],
            ..Config::default()
        }
    }

    #[test]
    fn test_axis_event_is_calibrated() {
        let (driver, mut executor) = setup(&config());

        executor.process_event(&InputEvent::AxisMoved {
            device: "Stick".into(),
            axis: 1,
            raw: 1000.0,
        });
        assert_eq!(driver.axis_value(1, 0x31), Some(32768));

        executor.process_event(&InputEvent::AxisMoved {
            device: "Stick".into(),
            axis: 1,
            raw: 500.0,
        });
        assert_eq!(driver.axis_value(1, 0x31), Some(16384));
        assert_eq!(executor.device(1).unwrap().axis(2).unwrap().value(), 0.0);
    }

    #[test]
    fn test_axis_button_edges() {
        let (driver, mut executor) = setup(&config());
        let event = |raw| InputEvent::AxisMoved { device: "Stick".into(), axis: 3, raw };

        executor.process_event(&event(0.1));
        assert_eq!(driver.button_state(1, 5), Some(false));

        executor.process_event(&event(0.5));
        assert_eq!(driver.button_state(1, 5), Some(true));

        executor.process_event(&event(0.55));
        executor.process_event(&event(0.9));
        assert_eq!(driver.button_state(1, 5), Some(false));
    }

    #[test]
    fn test_button_and_hat_events() {
        let (driver, mut executor) = setup(&config());

        executor.process_event(&InputEvent::ButtonChanged {
            device: "Stick".into(),
            button: 1,
            pressed: true,
        });
        assert_eq!(driver.button_state(1, 1), Some(true));

        executor.process_event(&InputEvent::HatChanged {
            device: "Stick".into(),
            hat: 1,
            direction: HatDirection::SOUTH_WEST,
        });
        assert_eq!(driver.hat_value(1, 1), Some(22500));
    }

    #[test]
    fn test_unbound_events_are_ignored() {
        let (driver, mut executor) = setup(&config());
        driver.clear_calls();

        executor.process_event(&InputEvent::ButtonChanged {
            device: "Pedals".into(),
            button: 1,
            pressed: true,
        });
        executor.process_event(&InputEvent::AxisMoved {
            device: "Stick".into(),
            axis: 7,
            raw: 0.3,
        });
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_missing_device_rejected() {
        let mut config = config();
        config.buttons[0].slot = 2;
        let driver = Arc::new(MockDriver::new().with_slot(1, MockSlot::new(4, 8, 1)));
        let handle = DriverHandle::open(driver, REQUIRED_DRIVER_VERSION).unwrap();
        let mut devices = BTreeMap::new();
        devices.insert(1, VirtualDevice::acquire(&handle, 1).unwrap());

        assert!(matches!(
            MappingExecutor::new(&config, devices),
            Err(ExecutorError::MissingDevice { slot: 2 })
        ));
    }

    #[test]
    fn test_missing_control_rejected() {
        let mut config = config();
        config.axes[0].output = 8;
        let driver = Arc::new(MockDriver::new().with_slot(1, MockSlot::new(4, 8, 1)));
        let handle = DriverHandle::open(driver, REQUIRED_DRIVER_VERSION).unwrap();
        let mut devices = BTreeMap::new();
        devices.insert(1, VirtualDevice::acquire(&handle, 1).unwrap());

        assert!(matches!(
            MappingExecutor::new(&config, devices),
            Err(ExecutorError::Driver(DriverError::InvalidControl { .. }))
        ));
    }

    #[test]
    fn test_shutdown_releases_devices() {
        let (driver, mut executor) = setup(&config());
        executor.shutdown();
        assert!(!driver.is_owned(1));
        drop(executor);
        assert_eq!(driver.release_count(1), 1);
    }
}
