//! Virtual output devices and their controls

pub mod controls;
pub mod device;
pub mod keep_alive;

pub use controls::{Axis, AxisName, Button, Hat, HatDirection};
pub use device::{AcquisitionState, AxisKey, VirtualDevice, DEFAULT_KEEP_ALIVE};
pub use keep_alive::PeriodicTimer;
