//! Output controls of a virtual device: axes, buttons and hats.
//!
//! Controls are owned by their [`VirtualDevice`](super::VirtualDevice) and
//! only reachable through it. Every read or write marks the device as used
//! for the keep-alive check. A cached value only changes once the driver
//! accepted the write.

use super::device::DeviceCore;
use crate::driver::DriverError;
use crate::transform::{process_axis, Deadzone, ResponseCurve};
use std::fmt;
use std::sync::Arc;

/// Axes a virtual device may expose, in driver order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AxisName {
    X,
    Y,
    Z,
    RX,
    RY,
    RZ,
    SL0,
    SL1,
}

impl AxisName {
    pub const ALL: [AxisName; 8] = [
        AxisName::X,
        AxisName::Y,
        AxisName::Z,
        AxisName::RX,
        AxisName::RY,
        AxisName::RZ,
        AxisName::SL0,
        AxisName::SL1,
    ];

    /// HID usage id the driver uses for this axis
    pub fn usage_id(self) -> u32 {
        0x30 + self as u32
    }

    /// 1-based position in [`AxisName::ALL`]
    pub fn index(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_index(index: u32) -> Option<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Analog axis, value in [-1, 1]
#[derive(Debug)]
pub struct Axis {
    core: Arc<DeviceCore>,
    name: AxisName,
    half_range: i64,
    value: f64,
    deadzone: Deadzone,
    curve: ResponseCurve,
}

impl Axis {
    /// `half_range` is half the raw maximum of a zero based driver range
    pub(crate) fn new(core: Arc<DeviceCore>, name: AxisName, half_range: i64) -> Self {
        Self {
            core,
            name,
            half_range,
            value: 0.0,
            deadzone: Deadzone::default(),
            curve: ResponseCurve::Identity,
        }
    }

    pub fn name(&self) -> AxisName {
        self.name
    }

    /// Current position in [-1, 1]
    pub fn value(&self) -> f64 {
        self.core.touch();
        self.value
    }

    /// Sets the axis from a value in [-1, 1], applying deadzone and
    /// response curve.
    pub fn set_value(&mut self, value: f64) -> Result<(), DriverError> {
        let value = process_axis(value, &self.deadzone, &self.curve);
        self.write_raw(self.raw_value(value))?;
        self.value = value;
        self.core.touch();
        Ok(())
    }

    pub fn set_deadzone(&mut self, deadzone: Deadzone) {
        self.deadzone = deadzone;
    }

    pub fn set_response_curve(&mut self, curve: ResponseCurve) {
        self.curve = curve;
    }

    pub fn deadzone(&self) -> &Deadzone {
        &self.deadzone
    }

    pub fn response_curve(&self) -> &ResponseCurve {
        &self.curve
    }

    /// Records that the driver was driven to the neutral position
    pub(crate) fn mark_centered(&mut self) {
        self.value = 0.0;
    }

    fn raw_value(&self, value: f64) -> i64 {
        let half = self.half_range as f64;
        (half + half * value) as i64
    }

    fn write_raw(&self, raw: i64) -> Result<(), DriverError> {
        if self
            .core
            .driver()
            .set_axis(self.core.slot(), self.name.usage_id(), raw)
        {
            Ok(())
        } else {
            Err(DriverError::WriteFailed {
                slot: self.core.slot(),
                control: format!("axis {}", self.name),
            })
        }
    }
}

/// Digital button
#[derive(Debug)]
pub struct Button {
    core: Arc<DeviceCore>,
    id: u32,
    pressed: bool,
}

impl Button {
    pub(crate) fn new(core: Arc<DeviceCore>, id: u32) -> Self {
        Self {
            core,
            id,
            pressed: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_pressed(&self) -> bool {
        self.core.touch();
        self.pressed
    }

    pub fn set_pressed(&mut self, pressed: bool) -> Result<(), DriverError> {
        if !self
            .core
            .driver()
            .set_button(self.core.slot(), self.id, pressed)
        {
            return Err(DriverError::WriteFailed {
                slot: self.core.slot(),
                control: format!("button {}", self.id),
            });
        }
        self.pressed = pressed;
        self.core.touch();
        Ok(())
    }

    pub(crate) fn mark_released(&mut self) {
        self.pressed = false;
    }
}

/// Hat direction as an `(x, y)` pair with components in {-1, 0, 1}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HatDirection {
    x: i8,
    y: i8,
}

impl HatDirection {
    pub const CENTER: HatDirection = HatDirection { x: 0, y: 0 };
    pub const NORTH: HatDirection = HatDirection { x: 0, y: 1 };
    pub const NORTH_EAST: HatDirection = HatDirection { x: 1, y: 1 };
    pub const EAST: HatDirection = HatDirection { x: 1, y: 0 };
    pub const SOUTH_EAST: HatDirection = HatDirection { x: 1, y: -1 };
    pub const SOUTH: HatDirection = HatDirection { x: 0, y: -1 };
    pub const SOUTH_WEST: HatDirection = HatDirection { x: -1, y: -1 };
    pub const WEST: HatDirection = HatDirection { x: -1, y: 0 };
    pub const NORTH_WEST: HatDirection = HatDirection { x: -1, y: 1 };

    /// Clockwise from north, centered first
    const ORDER: [HatDirection; 9] = [
        Self::CENTER,
        Self::NORTH,
        Self::NORTH_EAST,
        Self::EAST,
        Self::SOUTH_EAST,
        Self::SOUTH,
        Self::SOUTH_WEST,
        Self::WEST,
        Self::NORTH_WEST,
    ];

    /// Returns `None` unless both components are in {-1, 0, 1}
    pub fn new(x: i8, y: i8) -> Option<Self> {
        if (-1..=1).contains(&x) && (-1..=1).contains(&y) {
            Some(Self { x, y })
        } else {
            None
        }
    }

    /// Converts an up/right/down/left bitmask (1/2/4/8). Up wins over down
    /// and right over left when both bits are set.
    pub fn from_hat_bits(bits: u8) -> Self {
        let y = if bits & 0x01 != 0 {
            1
        } else if bits & 0x04 != 0 {
            -1
        } else {
            0
        };
        let x = if bits & 0x02 != 0 {
            1
        } else if bits & 0x08 != 0 {
            -1
        } else {
            0
        };
        Self { x, y }
    }

    pub fn x(self) -> i8 {
        self.x
    }

    pub fn y(self) -> i8 {
        self.y
    }

    pub fn is_centered(self) -> bool {
        self == Self::CENTER
    }

    /// 0 for centered, 1..=8 clockwise from north
    pub fn index(self) -> u8 {
        Self::ORDER
            .iter()
            .position(|d| *d == self)
            .map(|i| i as u8)
            .unwrap_or(0)
    }

    /// Angle in hundredths of a degree, -1 when centered
    pub fn continuous_angle(self) -> i32 {
        match self.index() {
            0 => -1,
            i => (i as i32 - 1) * 4500,
        }
    }
}

impl Default for HatDirection {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Continuous point-of-view hat
#[derive(Debug)]
pub struct Hat {
    core: Arc<DeviceCore>,
    id: u32,
    direction: HatDirection,
}

impl Hat {
    pub(crate) fn new(core: Arc<DeviceCore>, id: u32) -> Self {
        Self {
            core,
            id,
            direction: HatDirection::CENTER,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn direction(&self) -> HatDirection {
        self.core.touch();
        self.direction
    }

    pub fn set_direction(&mut self, direction: HatDirection) -> Result<(), DriverError> {
        if !self.core.driver().set_hat_continuous(
            self.core.slot(),
            self.id,
            direction.continuous_angle(),
        ) {
            return Err(DriverError::WriteFailed {
                slot: self.core.slot(),
                control: format!("hat {}", self.id),
            });
        }
        self.direction = direction;
        self.core.touch();
        Ok(())
    }

    pub(crate) fn mark_centered(&mut self) {
        self.direction = HatDirection::CENTER;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_usage_ids() {
        assert_eq!(AxisName::X.usage_id(), 0x30);
        assert_eq!(AxisName::RZ.usage_id(), 0x35);
        assert_eq!(AxisName::SL1.usage_id(), 0x37);
    }

    #[test]
    fn test_axis_index_round_trip() {
        for name in AxisName::ALL {
            assert_eq!(AxisName::from_index(name.index()), Some(name));
        }
        assert_eq!(AxisName::from_index(0), None);
        assert_eq!(AxisName::from_index(9), None);
    }

    #[test]
    fn test_continuous_angles() {
        assert_eq!(HatDirection::CENTER.continuous_angle(), -1);
        assert_eq!(HatDirection::NORTH.continuous_angle(), 0);
        assert_eq!(HatDirection::NORTH_EAST.continuous_angle(), 4500);
        assert_eq!(HatDirection::EAST.continuous_angle(), 9000);
        assert_eq!(HatDirection::SOUTH.continuous_angle(), 18000);
        assert_eq!(HatDirection::NORTH_WEST.continuous_angle(), 31500);
    }

    #[test]
    fn test_hat_index() {
        assert_eq!(HatDirection::CENTER.index(), 0);
        assert_eq!(HatDirection::NORTH.index(), 1);
        assert_eq!(HatDirection::WEST.index(), 7);
        assert_eq!(HatDirection::NORTH_WEST.index(), 8);
    }

    #[test]
    fn test_hat_from_bits() {
        assert_eq!(HatDirection::from_hat_bits(0), HatDirection::CENTER);
        assert_eq!(HatDirection::from_hat_bits(0x01), HatDirection::NORTH);
        assert_eq!(HatDirection::from_hat_bits(0x03), HatDirection::NORTH_EAST);
        assert_eq!(HatDirection::from_hat_bits(0x0C), HatDirection::SOUTH_WEST);
    }

    #[test]
    fn test_hat_new_validates() {
        assert_eq!(HatDirection::new(1, -1), Some(HatDirection::SOUTH_EAST));
        assert_eq!(HatDirection::new(2, 0), None);
    }
}
