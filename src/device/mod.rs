//! Physical device enumeration and virtual slot matching

pub mod descriptor;
pub mod matcher;
pub mod mock_source;

pub use descriptor::{
    enumerate, hardware_id, CapabilitySignature, DeviceDescriptor, DeviceId, DeviceIdMode,
    DeviceSource, Enumeration, RawDevice, DEFAULT_VIRTUAL_DEVICE_NAME, UNKNOWN_DEVICE_NAME,
};
pub use matcher::{match_virtual_devices, slot_signature, ConfigurationError, SlotBinding};
pub use mock_source::MockDeviceSource;

use crate::driver::DriverHandle;

/// Enumerates connected devices and binds the virtual ones to driver slots
pub fn enumerate_and_match(
    source: &dyn DeviceSource,
    handle: &DriverHandle,
    virtual_device_name: &str,
    max_slots: u32,
) -> Result<Enumeration, ConfigurationError> {
    let mut enumeration = enumerate(source, virtual_device_name);
    match_virtual_devices(handle, &mut enumeration.descriptors, max_slots)?;
    Ok(enumeration)
}
