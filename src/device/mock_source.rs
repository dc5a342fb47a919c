//! Mock device source for testing and dry runs

use super::descriptor::{DeviceSource, RawDevice, DEFAULT_VIRTUAL_DEVICE_NAME};
use log::info;

/// In-memory list of connected devices. `None` entries model devices that
/// fail to open.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceSource {
    devices: Vec<Option<RawDevice>>,
}

impl MockDeviceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: RawDevice) -> Self {
        self.devices.push(Some(device));
        self
    }

    /// Adds a physical device with the given name and counts
    pub fn with_physical(
        self,
        vendor_id: u16,
        product_id: u16,
        name: &str,
        axes: u32,
        buttons: u32,
        hats: u32,
    ) -> Self {
        let instance_id = self.devices.len() as u32;
        self.with_device(RawDevice {
            vendor_id,
            product_id,
            instance_id,
            name: Some(name.to_string()),
            axes,
            buttons,
            hats,
        })
    }

    /// Adds a device named like the virtual joystick driver's devices
    pub fn with_virtual(self, axes: u32, buttons: u32, hats: u32) -> Self {
        self.with_physical(0x1234, 0xBEAD, DEFAULT_VIRTUAL_DEVICE_NAME, axes, buttons, hats)
    }

    /// Adds a device that cannot be opened
    pub fn with_broken(mut self) -> Self {
        self.devices.push(None);
        self
    }
}

impl DeviceSource for MockDeviceSource {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn open(&self, index: usize) -> Option<RawDevice> {
        let device = self.devices.get(index).cloned().flatten();
        info!(
            "[MOCK INPUT] Open device {}: {}",
            index,
            device.as_ref().and_then(|d| d.name.as_deref()).unwrap_or("<failed>")
        );
        device
    }
}
