//! Virtual output device lifecycle
//!
//! A [`VirtualDevice`] owns one driver slot from construction until
//! [`VirtualDevice::invalidate`] (or drop). While it is held, a background
//! keep-alive timer forces a neutral write whenever the device went a full
//! period without being used, because the driver silently drops idle devices.

use super::controls::{Axis, AxisName, Button, Hat};
use super::keep_alive::PeriodicTimer;
use crate::driver::{DriverError, DriverHandle, SlotStatus, VJoyDriver, MAX_SLOTS};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Keep-alive period used when none is configured
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Lifecycle of a [`VirtualDevice`]. A device only exists once its slot
/// has been acquired, so there is no state for a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Acquired,
    /// Terminal
    Released,
}

/// Ways to look up an axis; every axis is registered under both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKey {
    Name(AxisName),
    /// 1-based position in [`AxisName::ALL`]
    Index(u32),
}

#[derive(Debug)]
struct Usage {
    last_used: Instant,
    last_check: Instant,
}

/// State shared between a device, its controls and its keep-alive thread
pub(crate) struct DeviceCore {
    driver: Arc<dyn VJoyDriver>,
    slot: u32,
    /// Usage id and raw center of every axis present on the slot
    axis_centers: Vec<(u32, i64)>,
    usage: Mutex<Usage>,
}

impl DeviceCore {
    fn new(driver: Arc<dyn VJoyDriver>, slot: u32, axis_centers: Vec<(u32, i64)>) -> Self {
        let now = Instant::now();
        Self {
            driver,
            slot,
            axis_centers,
            usage: Mutex::new(Usage {
                last_used: now,
                last_check: now,
            }),
        }
    }

    pub(crate) fn driver(&self) -> &dyn VJoyDriver {
        self.driver.as_ref()
    }

    pub(crate) fn slot(&self) -> u32 {
        self.slot
    }

    /// Marks the device as used now
    pub(crate) fn touch(&self) {
        self.usage().last_used = Instant::now();
    }

    fn last_used(&self) -> Instant {
        self.usage().last_used
    }

    fn usage(&self) -> MutexGuard<'_, Usage> {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Driver reset followed by centering every axis
    fn write_neutral(&self) -> Result<(), DriverError> {
        self.driver.reset(self.slot);
        for &(axis, center) in &self.axis_centers {
            if !self.driver.set_axis(self.slot, axis, center) {
                return Err(DriverError::WriteFailed {
                    slot: self.slot,
                    control: format!("axis {:#04x}", axis),
                });
            }
        }
        Ok(())
    }

    /// Forces a neutral write if the device was not used since the previous
    /// check. Returns whether the write happened.
    fn keep_alive_check(&self, now: Instant) -> Result<bool, DriverError> {
        let idle = {
            let mut usage = self.usage();
            let idle = usage.last_used <= usage.last_check;
            usage.last_check = now;
            idle
        };

        if idle {
            self.write_neutral()?;
        }
        Ok(idle)
    }
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("slot", &self.slot)
            .field("axes", &self.axis_centers.len())
            .finish()
    }
}

/// A virtual joystick slot held by this process
pub struct VirtualDevice {
    core: Arc<DeviceCore>,
    state: AcquisitionState,
    axes: Vec<Axis>,
    axis_keys: HashMap<AxisKey, usize>,
    buttons: BTreeMap<u32, Button>,
    hats: BTreeMap<u32, Hat>,
    keep_alive: Option<PeriodicTimer>,
}

impl VirtualDevice {
    /// Acquires `slot` with the default keep-alive period
    pub fn acquire(handle: &DriverHandle, slot: u32) -> Result<Self, DriverError> {
        Self::acquire_with_keep_alive(handle, slot, DEFAULT_KEEP_ALIVE)
    }

    /// Acquires `slot`, enumerates its controls, starts the keep-alive timer
    /// and resets every control.
    pub fn acquire_with_keep_alive(
        handle: &DriverHandle,
        slot: u32,
        keep_alive: Duration,
    ) -> Result<Self, DriverError> {
        let driver = Arc::clone(handle.driver());

        if slot == 0 || slot > MAX_SLOTS {
            return Err(DriverError::SlotUnavailable {
                slot,
                status: SlotStatus::Missing,
            });
        }

        let status = driver.slot_status(slot);
        if status != SlotStatus::Free {
            return Err(DriverError::SlotUnavailable { slot, status });
        }
        if !driver.acquire(slot) {
            return Err(DriverError::AcquireFailed { slot });
        }

        let axis_ranges = match Self::read_axis_ranges(driver.as_ref(), slot) {
            Ok(ranges) => ranges,
            Err(e) => {
                driver.release(slot);
                return Err(e);
            }
        };

        // From here on dropping `device` releases the slot
        let mut device = Self::build(driver, slot, axis_ranges);

        let tick_core = Arc::clone(&device.core);
        let timer = PeriodicTimer::start(
            &format!("keep-alive-{}", slot),
            keep_alive,
            move || match tick_core.keep_alive_check(Instant::now()) {
                Ok(true) => info!("Keep-alive reset of idle virtual device {}", tick_core.slot()),
                Ok(false) => trace!("Virtual device {} active", tick_core.slot()),
                Err(e) => warn!("Keep-alive write failed: {}", e),
            },
        )
        .map_err(|e| DriverError::KeepAlive {
            slot,
            reason: e.to_string(),
        })?;
        device.keep_alive = Some(timer);

        device.reset()?;

        info!("✓ Acquired virtual device: {}", device);
        Ok(device)
    }

    /// Returns `(axis, half_range)` for every axis present on the slot
    fn read_axis_ranges(
        driver: &dyn VJoyDriver,
        slot: u32,
    ) -> Result<Vec<(AxisName, i64)>, DriverError> {
        let mut ranges = Vec::new();
        for name in AxisName::ALL {
            if !driver.axis_exists(slot, name.usage_id()) {
                continue;
            }

            let (minimum, maximum) = driver.axis_bounds(slot, name.usage_id());
            // The raw axis write assumes a zero based range
            if minimum != 0 {
                return Err(DriverError::UnsupportedAxisRange {
                    slot,
                    axis: name.usage_id(),
                    minimum,
                });
            }
            ranges.push((name, maximum / 2));
        }
        Ok(ranges)
    }

    fn build(driver: Arc<dyn VJoyDriver>, slot: u32, axis_ranges: Vec<(AxisName, i64)>) -> Self {
        let centers = axis_ranges
            .iter()
            .map(|&(name, half)| (name.usage_id(), half))
            .collect();
        let button_count = driver.button_count(slot);
        let hat_count = driver.hat_count(slot);
        let core = Arc::new(DeviceCore::new(driver, slot, centers));

        let mut axes = Vec::new();
        let mut axis_keys = HashMap::new();
        for (name, half) in axis_ranges {
            axis_keys.insert(AxisKey::Name(name), axes.len());
            axis_keys.insert(AxisKey::Index(name.index()), axes.len());
            axes.push(Axis::new(Arc::clone(&core), name, half));
        }

        let buttons = (1..=button_count)
            .map(|id| (id, Button::new(Arc::clone(&core), id)))
            .collect();

        // Only continuous hats are supported
        let hats = (1..=hat_count)
            .map(|id| (id, Hat::new(Arc::clone(&core), id)))
            .collect();

        debug!(
            "Virtual device {}: {} axes, {} buttons, {} hats",
            slot,
            axes.len(),
            button_count,
            hat_count
        );

        Self {
            core,
            state: AcquisitionState::Acquired,
            axes,
            axis_keys,
            buttons,
            hats,
            keep_alive: None,
        }
    }

    pub fn slot(&self) -> u32 {
        self.core.slot()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Number of axis lookup keys. Each axis is registered under its name
    /// and its index, so this is twice [`axis_count`](Self::axis_count).
    pub fn axis_key_count(&self) -> usize {
        self.axis_keys.len()
    }

    pub fn button_count(&self) -> usize {
        self.buttons.len()
    }

    pub fn hat_count(&self) -> usize {
        self.hats.len()
    }

    /// When a control was last read or written
    pub fn last_used(&self) -> Instant {
        self.core.last_used()
    }

    pub fn is_axis_valid(&self, index: u32) -> bool {
        self.axis_keys.contains_key(&AxisKey::Index(index))
    }

    pub fn is_button_valid(&self, index: u32) -> bool {
        self.buttons.contains_key(&index)
    }

    pub fn is_hat_valid(&self, index: u32) -> bool {
        self.hats.contains_key(&index)
    }

    /// Axis by 1-based index (1 = X ... 8 = SL1)
    pub fn axis(&self, index: u32) -> Result<&Axis, DriverError> {
        let i = self.axis_slot(AxisKey::Index(index), index)?;
        Ok(&self.axes[i])
    }

    pub fn axis_mut(&mut self, index: u32) -> Result<&mut Axis, DriverError> {
        let i = self.axis_slot(AxisKey::Index(index), index)?;
        Ok(&mut self.axes[i])
    }

    pub fn axis_by_name(&self, name: AxisName) -> Result<&Axis, DriverError> {
        let i = self.axis_slot(AxisKey::Name(name), name.index())?;
        Ok(&self.axes[i])
    }

    pub fn axis_by_name_mut(&mut self, name: AxisName) -> Result<&mut Axis, DriverError> {
        let i = self.axis_slot(AxisKey::Name(name), name.index())?;
        Ok(&mut self.axes[i])
    }

    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter()
    }

    pub fn button(&self, index: u32) -> Result<&Button, DriverError> {
        self.ensure_acquired()?;
        let slot = self.slot();
        self.buttons
            .get(&index)
            .ok_or(DriverError::InvalidControl {
                slot,
                kind: "button",
                index,
            })
    }

    pub fn button_mut(&mut self, index: u32) -> Result<&mut Button, DriverError> {
        self.ensure_acquired()?;
        let slot = self.slot();
        self.buttons
            .get_mut(&index)
            .ok_or(DriverError::InvalidControl {
                slot,
                kind: "button",
                index,
            })
    }

    pub fn hat(&self, index: u32) -> Result<&Hat, DriverError> {
        self.ensure_acquired()?;
        let slot = self.slot();
        self.hats.get(&index).ok_or(DriverError::InvalidControl {
            slot,
            kind: "hat",
            index,
        })
    }

    pub fn hat_mut(&mut self, index: u32) -> Result<&mut Hat, DriverError> {
        self.ensure_acquired()?;
        let slot = self.slot();
        self.hats.get_mut(&index).ok_or(DriverError::InvalidControl {
            slot,
            kind: "hat",
            index,
        })
    }

    /// Drives every control to neutral. Axes go to their center (0.0),
    /// not to the driver's own reset value.
    pub fn reset(&mut self) -> Result<(), DriverError> {
        self.ensure_acquired()?;
        self.core.write_neutral()?;

        for axis in &mut self.axes {
            axis.mark_centered();
        }
        for button in self.buttons.values_mut() {
            button.mark_released();
        }
        for hat in self.hats.values_mut() {
            hat.mark_centered();
        }
        self.core.touch();
        Ok(())
    }

    /// Runs one keep-alive check now, exactly as the timer does. Returns
    /// whether a neutral write was forced.
    pub fn keep_alive_check(&self) -> Result<bool, DriverError> {
        self.ensure_acquired()?;
        self.core.keep_alive_check(Instant::now())
    }

    /// Stops the keep-alive timer, resets the controls and releases the
    /// slot. Calling it again is a no-op.
    pub fn invalidate(&mut self) -> Result<(), DriverError> {
        if self.state != AcquisitionState::Acquired {
            debug!("Virtual device {} already released", self.slot());
            return Ok(());
        }

        // Blocks until the timer thread has exited
        if let Some(mut timer) = self.keep_alive.take() {
            timer.stop();
        }

        let result = self.reset();
        self.core.driver().release(self.slot());
        self.state = AcquisitionState::Released;
        info!("Released virtual device {}", self.slot());
        result
    }

    fn ensure_acquired(&self) -> Result<(), DriverError> {
        match self.state {
            AcquisitionState::Acquired => Ok(()),
            AcquisitionState::Released => Err(DriverError::Released { slot: self.slot() }),
        }
    }

    fn axis_slot(&self, key: AxisKey, index: u32) -> Result<usize, DriverError> {
        self.ensure_acquired()?;
        self.axis_keys
            .get(&key)
            .copied()
            .ok_or(DriverError::InvalidControl {
                slot: self.slot(),
                kind: "axis",
                index,
            })
    }
}

impl fmt::Display for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vJoyId={} axis={} buttons={} hats={}",
            self.slot(),
            self.axis_count(),
            self.button_count(),
            self.hat_count()
        )
    }
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("slot", &self.slot())
            .field("state", &self.state)
            .field("axes", &self.axis_count())
            .field("buttons", &self.button_count())
            .field("hats", &self.hat_count())
            .finish()
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if self.state == AcquisitionState::Acquired {
            if let Err(e) = self.invalidate() {
                warn!("Error releasing virtual device {}: {}", self.slot(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock_driver::{DriverCall, MockDriver, MockSlot};
    use crate::driver::REQUIRED_DRIVER_VERSION;
    use crate::transform::{create_deadzone_function, CurveKind, ResponseCurve};
    use crate::vjoy::HatDirection;

    fn setup(layout: MockSlot) -> (Arc<MockDriver>, DriverHandle) {
        let driver = Arc::new(MockDriver::new().with_slot(1, layout));
        let handle = DriverHandle::open(driver.clone(), REQUIRED_DRIVER_VERSION).unwrap();
        (driver, handle)
    }

    #[test]
    fn test_acquire_enumerates_controls() {
        let (driver, handle) = setup(MockSlot::new(4, 8, 1));
        let device = VirtualDevice::acquire(&handle, 1).unwrap();

        assert_eq!(device.state(), AcquisitionState::Acquired);
        assert_eq!(device.axis_count(), 4);
        assert_eq!(device.axis_key_count(), 8);
        assert_eq!(device.button_count(), 8);
        assert_eq!(device.hat_count(), 1);
        assert!(device.is_axis_valid(4));
        assert!(!device.is_axis_valid(5));
        assert!(device.is_button_valid(8));
        assert!(!device.is_button_valid(9));
        assert!(driver.is_owned(1));
        assert_eq!(device.to_string(), "vJoyId=1 axis=4 buttons=8 hats=1");
    }

    #[test]
    fn test_acquire_busy_slot_fails() {
        let (driver, handle) = setup(MockSlot::new(2, 2, 0));
        driver.mark_busy(1);

        let err = VirtualDevice::acquire(&handle, 1).unwrap_err();
        assert_eq!(
            err,
            DriverError::SlotUnavailable {
                slot: 1,
                status: SlotStatus::Busy
            }
        );
    }

    #[test]
    fn test_same_slot_cannot_be_held_twice() {
        let (_driver, handle) = setup(MockSlot::new(2, 2, 0));
        let _first = VirtualDevice::acquire(&handle, 1).unwrap();
        assert!(VirtualDevice::acquire(&handle, 1).is_err());
    }

    #[test]
    fn test_missing_slot_fails() {
        let (_driver, handle) = setup(MockSlot::new(2, 2, 0));
        assert!(matches!(
            VirtualDevice::acquire(&handle, 2),
            Err(DriverError::SlotUnavailable {
                slot: 2,
                status: SlotStatus::Missing
            })
        ));
        assert!(VirtualDevice::acquire(&handle, 0).is_err());
        assert!(VirtualDevice::acquire(&handle, 17).is_err());
    }

    #[test]
    fn test_non_zero_axis_minimum_releases_slot() {
        let mut layout = MockSlot::new(2, 2, 0);
        layout.axis_min = -100;
        let (driver, handle) = setup(layout);

        let err = VirtualDevice::acquire(&handle, 1).unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedAxisRange { slot: 1, .. }));
        assert!(!driver.is_owned(1));
    }

    #[test]
    fn test_axis_write_maps_to_raw() {
        let (driver, handle) = setup(MockSlot::new(2, 0, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

        device.axis_mut(1).unwrap().set_value(1.0).unwrap();
        assert_eq!(driver.axis_value(1, 0x30), Some(32768));

        device.axis_mut(1).unwrap().set_value(-1.0).unwrap();
        assert_eq!(driver.axis_value(1, 0x30), Some(0));

        device.axis_by_name_mut(AxisName::Y).unwrap().set_value(0.5).unwrap();
        assert_eq!(driver.axis_value(1, 0x31), Some(24576));
        assert_eq!(device.axis(2).unwrap().value(), 0.5);
    }

    #[test]
    fn test_axis_write_applies_deadzone_and_curve() {
        let (_driver, handle) = setup(MockSlot::new(1, 0, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

        let axis = device.axis_mut(1).unwrap();
        axis.set_deadzone(create_deadzone_function(-1.0, -0.1, 0.1, 1.0).unwrap());
        axis.set_value(0.05).unwrap();
        assert_eq!(axis.value(), 0.0);

        axis.set_response_curve(
            ResponseCurve::from_points(CurveKind::CubicSpline, &[(-1.0, 1.0), (1.0, -1.0)])
                .unwrap(),
        );
        axis.set_value(1.0).unwrap();
        assert!((axis.value() + 1.0).abs() < 1e-12);

        // Out of range input is clamped
        axis.set_response_curve(ResponseCurve::Identity);
        axis.set_value(4.0).unwrap();
        assert_eq!(axis.value(), 1.0);
    }

    #[test]
    fn test_reset_centers_axes() {
        let (driver, handle) = setup(MockSlot::new(8, 4, 1));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

        for index in 1..=8 {
            device.axis_mut(index).unwrap().set_value(0.8).unwrap();
        }
        device.button_mut(2).unwrap().set_pressed(true).unwrap();
        device.hat_mut(1).unwrap().set_direction(HatDirection::EAST).unwrap();

        device.reset().unwrap();

        for axis in device.axes() {
            assert_eq!(axis.value(), 0.0);
            assert_eq!(driver.axis_value(1, axis.name().usage_id()), Some(16384));
        }
        assert!(!device.button(2).unwrap().is_pressed());
        assert_eq!(device.hat(1).unwrap().direction(), HatDirection::CENTER);
    }

    #[test]
    fn test_invalid_control_index() {
        let (_driver, handle) = setup(MockSlot::new(2, 2, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

        assert!(matches!(
            device.axis(7),
            Err(DriverError::InvalidControl { kind: "axis", index: 7, .. })
        ));
        assert!(device.button_mut(3).is_err());
        assert!(device.hat(1).is_err());
    }

    #[test]
    fn test_failed_write_is_reported() {
        let (driver, handle) = setup(MockSlot::new(1, 1, 1));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();
        driver.set_fail_writes(true);

        assert!(matches!(
            device.button_mut(1).unwrap().set_pressed(true),
            Err(DriverError::WriteFailed { slot: 1, .. })
        ));
        assert!(device.hat_mut(1).unwrap().set_direction(HatDirection::NORTH).is_err());
        assert!(device.axis_mut(1).unwrap().set_value(0.9).is_err());

        // Rejected writes leave the cached state alone
        assert!(!device.button(1).unwrap().is_pressed());
        assert_eq!(device.hat(1).unwrap().direction(), HatDirection::CENTER);
        assert_eq!(device.axis(1).unwrap().value(), 0.0);
        assert_eq!(driver.button_state(1, 1), Some(false));
        assert_eq!(driver.axis_value(1, 0x30), Some(16384));
        driver.set_fail_writes(false);

        device.axis_mut(1).unwrap().set_value(0.5).unwrap();
        assert_eq!(device.axis(1).unwrap().value(), 0.5);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (driver, handle) = setup(MockSlot::new(2, 2, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

        device.invalidate().unwrap();
        device.invalidate().unwrap();
        drop(device);

        assert_eq!(driver.release_count(1), 1);
        assert!(!driver.is_owned(1));
    }

    #[test]
    fn test_released_device_rejects_access() {
        let (_driver, handle) = setup(MockSlot::new(2, 2, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();
        device.invalidate().unwrap();

        assert_eq!(device.state(), AcquisitionState::Released);
        assert_eq!(device.axis(1).unwrap_err(), DriverError::Released { slot: 1 });
        assert!(device.reset().is_err());
        assert!(device.keep_alive_check().is_err());
    }

    #[test]
    fn test_drop_releases_slot() {
        let (driver, handle) = setup(MockSlot::new(2, 2, 0));
        {
            let _device = VirtualDevice::acquire(&handle, 1).unwrap();
            assert!(driver.is_owned(1));
        }
        assert!(!driver.is_owned(1));
        assert_eq!(driver.release_count(1), 1);
    }

    #[test]
    fn test_invalidate_sequence() {
        let (driver, handle) = setup(MockSlot::new(1, 0, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();
        driver.clear_calls();

        device.invalidate().unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Reset(1),
                DriverCall::SetAxis {
                    slot: 1,
                    axis: 0x30,
                    value: 16384
                },
                DriverCall::Release(1),
            ]
        );
    }

    #[test]
    fn test_keep_alive_check_resets_idle_device() {
        let (driver, handle) = setup(MockSlot::new(2, 2, 0));
        let device = VirtualDevice::acquire(&handle, 1).unwrap();

        // Construction reset counts as use
        assert!(!device.keep_alive_check().unwrap());
        let resets = driver.reset_count(1);

        // Nothing touched since the previous check
        assert!(device.keep_alive_check().unwrap());
        assert_eq!(driver.reset_count(1), resets + 1);
    }

    #[test]
    fn test_keep_alive_check_skips_used_device() {
        let (driver, handle) = setup(MockSlot::new(2, 2, 0));
        let mut device = VirtualDevice::acquire(&handle, 1).unwrap();
        device.keep_alive_check().unwrap();
        let resets = driver.reset_count(1);

        device.button_mut(1).unwrap().set_pressed(true).unwrap();
        assert!(!device.keep_alive_check().unwrap());

        // Reads count as use too
        let _ = device.axis(1).unwrap().value();
        assert!(!device.keep_alive_check().unwrap());

        assert_eq!(driver.reset_count(1), resets);
        assert_eq!(driver.button_state(1, 1), Some(true));
    }
}
