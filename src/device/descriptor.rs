//! Physical device descriptors and enumeration

use log::{debug, error, info};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Name substituted when a device does not report a readable name
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown device";

/// Name the virtual joystick driver gives its devices
pub const DEFAULT_VIRTUAL_DEVICE_NAME: &str = "vJoy Device";

/// Raw snapshot of one connected device as read from the input subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct RawDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Session id assigned by the OS, changes across reconnects
    pub instance_id: u32,
    /// `None` when the name could not be read
    pub name: Option<String>,
    pub axes: u32,
    pub buttons: u32,
    pub hats: u32,
}

/// Enumeration side of the OS input subsystem
pub trait DeviceSource {
    /// Number of devices currently connected
    fn device_count(&self) -> usize;

    /// Opens the device at `index`, `None` if it cannot be opened
    fn open(&self, index: usize) -> Option<RawDevice>;
}

/// `(axis count, button count, hat count)` used to correlate a virtual
/// descriptor with a driver slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilitySignature {
    pub axes: u32,
    pub buttons: u32,
    pub hats: u32,
}

impl CapabilitySignature {
    pub fn new(axes: u32, buttons: u32, hats: u32) -> Self {
        Self {
            axes,
            buttons,
            hats,
        }
    }
}

impl fmt::Display for CapabilitySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(axes={}, buttons={}, hats={})",
            self.axes, self.buttons, self.hats
        )
    }
}

/// Identity and capabilities of one device seen during an enumeration pass
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    hardware_id: u32,
    session_id: u32,
    name: String,
    axes: u32,
    buttons: u32,
    hats: u32,
    is_virtual: bool,
    vjoy_id: Option<u32>,
}

impl DeviceDescriptor {
    /// Builds a descriptor, substituting [`UNKNOWN_DEVICE_NAME`] for a
    /// missing name.
    pub fn from_raw(raw: &RawDevice, virtual_device_name: &str) -> Self {
        let name = match &raw.name {
            Some(name) => name.clone(),
            None => {
                error!("Encountered an invalid device name");
                UNKNOWN_DEVICE_NAME.to_string()
            }
        };

        Self {
            hardware_id: hardware_id(raw.vendor_id, raw.product_id),
            session_id: raw.instance_id,
            is_virtual: name == virtual_device_name,
            name,
            axes: raw.axes,
            buttons: raw.buttons,
            hats: raw.hats,
            vjoy_id: None,
        }
    }

    pub fn hardware_id(&self) -> u32 {
        self.hardware_id
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axes(&self) -> u32 {
        self.axes
    }

    pub fn buttons(&self) -> u32 {
        self.buttons
    }

    pub fn hats(&self) -> u32 {
        self.hats
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn signature(&self) -> CapabilitySignature {
        CapabilitySignature::new(self.axes, self.buttons, self.hats)
    }

    /// Virtual slot bound to this descriptor, if matched
    pub fn vjoy_id(&self) -> Option<u32> {
        self.vjoy_id
    }

    /// Binds the descriptor to a slot. A descriptor is bound at most once;
    /// returns `false` if it already was.
    pub(crate) fn assign_vjoy_id(&mut self, slot: u32) -> bool {
        if self.vjoy_id.is_some() {
            return false;
        }
        self.vjoy_id = Some(slot);
        true
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:08X}:{}]", self.name, self.hardware_id, self.session_id)
    }
}

/// Composite vendor/product id, stable across reconnects
pub fn hardware_id(vendor_id: u16, product_id: u16) -> u32 {
    ((vendor_id as u32) << 16) + product_id as u32
}

/// How devices are keyed for the rest of a run.
///
/// When two connected devices share a hardware id the hardware id alone is
/// ambiguous, so the session id is included as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdMode {
    Unique,
    WithSessionId,
}

/// Key identifying a device under a [`DeviceIdMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Hardware(u32),
    Session { hardware_id: u32, session_id: u32 },
}

impl DeviceIdMode {
    /// `WithSessionId` if any hardware id occurs more than once
    pub fn detect(descriptors: &[DeviceDescriptor]) -> Self {
        let mut seen = HashSet::new();
        if descriptors.iter().all(|d| seen.insert(d.hardware_id())) {
            DeviceIdMode::Unique
        } else {
            DeviceIdMode::WithSessionId
        }
    }

    pub fn device_id(self, descriptor: &DeviceDescriptor) -> DeviceId {
        self.get_device_id(descriptor.hardware_id(), descriptor.session_id())
    }

    pub fn get_device_id(self, hardware_id: u32, session_id: u32) -> DeviceId {
        match self {
            DeviceIdMode::Unique => DeviceId::Hardware(hardware_id),
            DeviceIdMode::WithSessionId => DeviceId::Session {
                hardware_id,
                session_id,
            },
        }
    }

    /// Splits an id into hardware id and, when present, session id
    pub fn extract_ids(id: &DeviceId) -> (u32, Option<u32>) {
        match *id {
            DeviceId::Hardware(hardware_id) => (hardware_id, None),
            DeviceId::Session {
                hardware_id,
                session_id,
            } => (hardware_id, Some(session_id)),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Hardware(hw) => write!(f, "{:08X}", hw),
            DeviceId::Session {
                hardware_id,
                session_id,
            } => write!(f, "{:08X}:{}", hardware_id, session_id),
        }
    }
}

/// Result of one enumeration pass
#[derive(Debug, Clone)]
pub struct Enumeration {
    pub descriptors: Vec<DeviceDescriptor>,
    pub id_mode: DeviceIdMode,
    /// Problems that were recovered from
    pub diagnostics: Vec<String>,
}

impl Enumeration {
    pub fn virtual_devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.descriptors.iter().filter(|d| d.is_virtual())
    }

    pub fn physical_devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.descriptors.iter().filter(|d| !d.is_virtual())
    }

    /// First descriptor with the given name
    pub fn find_by_name(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    /// Ids of every physical device reporting `name`
    pub fn device_ids(&self, name: &str) -> Vec<DeviceId> {
        self.physical_devices()
            .filter(|d| d.name() == name)
            .map(|d| self.id_mode.device_id(d))
            .collect()
    }

    /// Physical device names carried by more than one device id. Input
    /// events name their device, so these devices cannot be told apart by
    /// the bindings.
    pub fn ambiguous_names(&self) -> Vec<&str> {
        let mut ids: HashMap<&str, HashSet<DeviceId>> = HashMap::new();
        for descriptor in self.physical_devices() {
            ids.entry(descriptor.name())
                .or_default()
                .insert(self.id_mode.device_id(descriptor));
        }

        let mut names: Vec<&str> = ids
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }
}

/// Reads every connected device. Devices that fail to open and unreadable
/// names are recorded as diagnostics; enumeration continues either way.
pub fn enumerate(source: &dyn DeviceSource, virtual_device_name: &str) -> Enumeration {
    let mut descriptors = Vec::new();
    let mut diagnostics = Vec::new();

    for index in 0..source.device_count() {
        let Some(raw) = source.open(index) else {
            error!("Invalid joystick device at id {}", index);
            diagnostics.push(format!("Invalid joystick device at id {}", index));
            continue;
        };

        if raw.name.is_none() {
            diagnostics.push(format!("Device at id {} has an invalid name", index));
        }
        let descriptor = DeviceDescriptor::from_raw(&raw, virtual_device_name);
        debug!(
            "Device {}: {} {} virtual={}",
            index,
            descriptor,
            descriptor.signature(),
            descriptor.is_virtual()
        );
        descriptors.push(descriptor);
    }

    let id_mode = DeviceIdMode::detect(&descriptors);
    info!(
        "Enumerated {} devices ({} diagnostics), id mode {:?}",
        descriptors.len(),
        diagnostics.len(),
        id_mode
    );

    Enumeration {
        descriptors,
        id_mode,
        diagnostics,
    }
}
