//! Mock virtual joystick driver.
//!
//! Keeps slot state in memory and records every call instead of talking to
//! the OS. Used by the tests and by the dry-run binary so the mapping and
//! lifecycle logic can be exercised without the native driver installed.

use super::{DriverVersion, SlotStatus, VJoyDriver, REQUIRED_DRIVER_VERSION};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Axis usage ids reset to their midpoint by the driver; all others go to 0
const DRIVER_CENTERED_AXES: [u32; 3] = [0x30, 0x31, 0x32];

/// Layout of a mock slot
#[derive(Debug, Clone, PartialEq)]
pub struct MockSlot {
    /// Usage ids of the axes present on the slot
    pub axes: Vec<u32>,
    pub axis_min: i64,
    pub axis_max: i64,
    pub buttons: u32,
    pub hats: u32,
}

impl MockSlot {
    /// Slot with the first `axes` axes (X, Y, Z, ...) present
    pub fn new(axes: u32, buttons: u32, hats: u32) -> Self {
        Self {
            axes: (0..axes.min(8)).map(|i| 0x30 + i).collect(),
            axis_min: 0,
            axis_max: 32768,
            buttons,
            hats,
        }
    }
}

/// A recorded driver call
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Acquire(u32),
    Release(u32),
    Reset(u32),
    SetAxis { slot: u32, axis: u32, value: i64 },
    SetButton { slot: u32, button: u32, pressed: bool },
    SetHatDiscrete { slot: u32, hat: u32, code: i32 },
    SetHatContinuous { slot: u32, hat: u32, angle: i32 },
}

#[derive(Debug)]
struct SlotState {
    layout: MockSlot,
    owned: bool,
    busy_elsewhere: bool,
    axis_values: HashMap<u32, i64>,
    buttons: HashMap<u32, bool>,
    hats: HashMap<u32, i32>,
}

impl SlotState {
    fn new(layout: MockSlot) -> Self {
        let mut state = Self {
            layout,
            owned: false,
            busy_elsewhere: false,
            axis_values: HashMap::new(),
            buttons: HashMap::new(),
            hats: HashMap::new(),
        };
        state.driver_reset();
        state
    }

    fn driver_reset(&mut self) {
        let mid = (self.layout.axis_min + self.layout.axis_max) / 2;
        for &axis in &self.layout.axes {
            let value = if DRIVER_CENTERED_AXES.contains(&axis) {
                mid
            } else {
                self.layout.axis_min
            };
            self.axis_values.insert(axis, value);
        }
        for button in 1..=self.layout.buttons {
            self.buttons.insert(button, false);
        }
        for hat in 1..=self.layout.hats {
            self.hats.insert(hat, -1);
        }
    }
}

#[derive(Debug)]
struct MockState {
    running: bool,
    version: DriverVersion,
    fail_writes: bool,
    slots: BTreeMap<u32, SlotState>,
    calls: Vec<DriverCall>,
}

/// In-memory driver implementing [`VJoyDriver`]
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// A running driver of the required version with no slots configured
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                running: true,
                version: REQUIRED_DRIVER_VERSION,
                fail_writes: false,
                slots: BTreeMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_slot(self, slot: u32, layout: MockSlot) -> Self {
        self.add_slot(slot, layout);
        self
    }

    pub fn add_slot(&self, slot: u32, layout: MockSlot) {
        self.state().slots.insert(slot, SlotState::new(layout));
    }

    pub fn set_running(&self, running: bool) {
        self.state().running = running;
    }

    pub fn set_version(&self, version: DriverVersion) {
        self.state().version = version;
    }

    /// Every subsequent write call is refused
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Marks a slot as owned by some other process
    pub fn mark_busy(&self, slot: u32) {
        if let Some(s) = self.state().slots.get_mut(&slot) {
            s.busy_elsewhere = true;
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&DriverCall) -> bool,
    {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn release_count(&self, slot: u32) -> usize {
        self.count_calls(|c| *c == DriverCall::Release(slot))
    }

    pub fn reset_count(&self, slot: u32) -> usize {
        self.count_calls(|c| *c == DriverCall::Reset(slot))
    }

    pub fn is_owned(&self, slot: u32) -> bool {
        self.state().slots.get(&slot).map(|s| s.owned).unwrap_or(false)
    }

    pub fn axis_value(&self, slot: u32, axis: u32) -> Option<i64> {
        self.state()
            .slots
            .get(&slot)
            .and_then(|s| s.axis_values.get(&axis).copied())
    }

    pub fn button_state(&self, slot: u32, button: u32) -> Option<bool> {
        self.state()
            .slots
            .get(&slot)
            .and_then(|s| s.buttons.get(&button).copied())
    }

    pub fn hat_value(&self, slot: u32, hat: u32) -> Option<i32> {
        self.state()
            .slots
            .get(&slot)
            .and_then(|s| s.hats.get(&hat).copied())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a write to an owned slot, records it, and reports acceptance
    fn write<F>(&self, slot: u32, call: DriverCall, apply: F) -> bool
    where
        F: FnOnce(&mut SlotState) -> bool,
    {
        let mut state = self.state();
        state.calls.push(call);
        if state.fail_writes {
            return false;
        }
        match state.slots.get_mut(&slot) {
            Some(s) if s.owned => apply(s),
            _ => false,
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VJoyDriver for MockDriver {
    fn is_driver_running(&self) -> bool {
        self.state().running
    }

    fn driver_version(&self) -> DriverVersion {
        self.state().version
    }

    fn slot_status(&self, slot: u32) -> SlotStatus {
        match self.state().slots.get(&slot) {
            None => SlotStatus::Missing,
            Some(s) if s.owned || s.busy_elsewhere => SlotStatus::Busy,
            Some(_) => SlotStatus::Free,
        }
    }

    fn acquire(&self, slot: u32) -> bool {
        let mut state = self.state();
        state.calls.push(DriverCall::Acquire(slot));
        let acquired = match state.slots.get_mut(&slot) {
            Some(s) if !s.owned && !s.busy_elsewhere => {
                s.owned = true;
                true
            }
            _ => false,
        };
        info!("[MOCK VJOY] Acquire slot {}: {}", slot, acquired);
        acquired
    }

    fn release(&self, slot: u32) {
        let mut state = self.state();
        state.calls.push(DriverCall::Release(slot));
        if let Some(s) = state.slots.get_mut(&slot) {
            s.owned = false;
        }
        info!("[MOCK VJOY] Release slot {}", slot);
    }

    fn reset(&self, slot: u32) {
        let mut state = self.state();
        state.calls.push(DriverCall::Reset(slot));
        if let Some(s) = state.slots.get_mut(&slot) {
            if s.owned {
                s.driver_reset();
            }
        }
        info!("[MOCK VJOY] Reset slot {}", slot);
    }

    fn axis_bounds(&self, slot: u32, _axis: u32) -> (i64, i64) {
        self.state()
            .slots
            .get(&slot)
            .map(|s| (s.layout.axis_min, s.layout.axis_max))
            .unwrap_or((0, 0))
    }

    fn axis_exists(&self, slot: u32, axis: u32) -> bool {
        self.state()
            .slots
            .get(&slot)
            .map(|s| s.layout.axes.contains(&axis))
            .unwrap_or(false)
    }

    fn button_count(&self, slot: u32) -> u32 {
        self.state()
            .slots
            .get(&slot)
            .map(|s| s.layout.buttons)
            .unwrap_or(0)
    }

    fn hat_count(&self, slot: u32) -> u32 {
        self.state()
            .slots
            .get(&slot)
            .map(|s| s.layout.hats)
            .unwrap_or(0)
    }

    fn set_axis(&self, slot: u32, axis: u32, raw_value: i64) -> bool {
        debug!("[MOCK VJOY] Slot {} axis {:#04x} = {}", slot, axis, raw_value);
        let call = DriverCall::SetAxis {
            slot,
            axis,
            value: raw_value,
        };
        self.write(slot, call, |s| {
            if !s.layout.axes.contains(&axis) {
                return false;
            }
            s.axis_values.insert(axis, raw_value);
            true
        })
    }

    fn set_button(&self, slot: u32, button: u32, pressed: bool) -> bool {
        debug!("[MOCK VJOY] Slot {} button {} = {}", slot, button, pressed);
        let call = DriverCall::SetButton {
            slot,
            button,
            pressed,
        };
        self.write(slot, call, |s| {
            if button == 0 || button > s.layout.buttons {
                return false;
            }
            s.buttons.insert(button, pressed);
            true
        })
    }

    fn set_hat_discrete(&self, slot: u32, hat: u32, direction_code: i32) -> bool {
        debug!("[MOCK VJOY] Slot {} discrete hat {} = {}", slot, hat, direction_code);
        let call = DriverCall::SetHatDiscrete {
            slot,
            hat,
            code: direction_code,
        };
        // The mock only models continuous hats
        self.write(slot, call, |_| false)
    }

    fn set_hat_continuous(&self, slot: u32, hat: u32, angle_hundredths: i32) -> bool {
        debug!("[MOCK VJOY] Slot {} hat {} = {}", slot, hat, angle_hundredths);
        let call = DriverCall::SetHatContinuous {
            slot,
            hat,
            angle: angle_hundredths,
        };
        self.write(slot, call, |s| {
            if hat == 0 || hat > s.layout.hats {
                return false;
            }
            s.hats.insert(hat, angle_hundredths);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_status_tracks_ownership() {
        let driver = MockDriver::new().with_slot(1, MockSlot::new(4, 8, 1));
        assert_eq!(driver.slot_status(1), SlotStatus::Free);
        assert_eq!(driver.slot_status(2), SlotStatus::Missing);

        assert!(driver.acquire(1));
        assert_eq!(driver.slot_status(1), SlotStatus::Busy);
        assert!(!driver.acquire(1));

        driver.release(1);
        assert_eq!(driver.slot_status(1), SlotStatus::Free);
    }

    #[test]
    fn test_writes_require_ownership() {
        let driver = MockDriver::new().with_slot(1, MockSlot::new(2, 4, 1));
        assert!(!driver.set_button(1, 1, true));

        assert!(driver.acquire(1));
        assert!(driver.set_button(1, 1, true));
        assert!(!driver.set_button(1, 5, true));
        assert!(driver.set_axis(1, 0x31, 100));
        assert!(!driver.set_axis(1, 0x32, 100));
        assert_eq!(driver.axis_value(1, 0x31), Some(100));
    }

    #[test]
    fn test_reset_uses_driver_defaults() {
        let driver = MockDriver::new().with_slot(1, MockSlot::new(6, 0, 0));
        assert!(driver.acquire(1));
        assert!(driver.set_axis(1, 0x33, 1234));
        driver.reset(1);

        assert_eq!(driver.axis_value(1, 0x30), Some(16384));
        // Rotational axes go to the raw minimum, not their midpoint
        assert_eq!(driver.axis_value(1, 0x33), Some(0));
    }

    #[test]
    fn test_calls_are_recorded() {
        let driver = MockDriver::new().with_slot(3, MockSlot::new(1, 1, 0));
        driver.acquire(3);
        driver.reset(3);
        driver.release(3);
        assert_eq!(
            driver.calls(),
            vec![DriverCall::Acquire(3), DriverCall::Reset(3), DriverCall::Release(3)]
        );
        assert_eq!(driver.release_count(3), 1);
    }
}
