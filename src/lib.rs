//! vjoy-remap: physical joystick to virtual joystick remapping
//!
//! This library binds virtual joystick slots to the devices the OS reports,
//! transforms physical axis samples (calibration, deadzone, response curve)
//! and writes the results to virtual devices kept alive by a background timer.

pub mod device;
pub mod driver;
pub mod manager;
pub mod mapping;
pub mod transform;
pub mod vjoy;

// Re-export commonly used items
pub use device::{enumerate_and_match, ConfigurationError, DeviceDescriptor, DeviceSource};
pub use driver::{DriverError, DriverHandle, VJoyDriver};
pub use manager::{ManagerError, RemapManager};
pub use mapping::{Config, InputEvent, MappingExecutor};
pub use transform::{create_calibration_function, create_deadzone_function, InputRangeError};
pub use vjoy::{AxisName, HatDirection, VirtualDevice};
