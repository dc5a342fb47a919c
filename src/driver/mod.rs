//! Virtual joystick driver interface
//!
//! The native binding that talks to the OS-level virtual joystick driver is
//! an external collaborator; this module only defines the contract the rest
//! of the crate relies on, plus an in-memory implementation for testing.

pub mod mock_driver;

pub use mock_driver::MockDriver;

use log::{debug, info};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Driver version this crate is written against (2.1.8)
pub const REQUIRED_DRIVER_VERSION: DriverVersion = DriverVersion(0x218);

/// Highest slot index the driver supports
pub const MAX_SLOTS: u32 = 16;

/// Packed driver version, e.g. `0x218` for 2.1.8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverVersion(pub u32);

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            (self.0 >> 8) & 0xF,
            (self.0 >> 4) & 0xF,
            self.0 & 0xF
        )
    }
}

/// Ownership status of a virtual device slot as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Present and not owned by anyone
    Free,
    /// Present but owned by this or another process
    Busy,
    /// Not configured in the driver
    Missing,
}

#[derive(Debug, Error, PartialEq)]
pub enum DriverError {
    #[error("Virtual joystick driver is not currently running")]
    NotRunning,

    #[error("Running incompatible driver version {found}, {required} required")]
    VersionMismatch {
        found: DriverVersion,
        required: DriverVersion,
    },

    #[error("Virtual device {slot} is not available (status: {status:?})")]
    SlotUnavailable { slot: u32, status: SlotStatus },

    #[error("Failed to acquire virtual device {slot}")]
    AcquireFailed { slot: u32 },

    #[error("Failed setting {control} on virtual device {slot}")]
    WriteFailed { slot: u32, control: String },

    #[error("Invalid {kind} index requested on virtual device {slot}: {index}")]
    InvalidControl {
        slot: u32,
        kind: &'static str,
        index: u32,
    },

    #[error("Axis {axis:#04x} on virtual device {slot} has minimum {minimum}, expected 0")]
    UnsupportedAxisRange { slot: u32, axis: u32, minimum: i64 },

    #[error("Virtual device {slot} has already been released")]
    Released { slot: u32 },

    #[error("Failed to start keep-alive timer for virtual device {slot}: {reason}")]
    KeepAlive { slot: u32, reason: String },
}

/// Operations exposed by the native virtual joystick binding.
///
/// Slot indices are 1-based. Boolean results report whether the driver
/// accepted the call.
pub trait VJoyDriver: Send + Sync {
    fn is_driver_running(&self) -> bool;

    fn driver_version(&self) -> DriverVersion;

    fn slot_status(&self, slot: u32) -> SlotStatus;

    fn acquire(&self, slot: u32) -> bool;

    fn release(&self, slot: u32);

    /// Drives the slot to the driver's own neutral state
    fn reset(&self, slot: u32);

    /// Raw `(minimum, maximum)` of an axis identified by its usage id
    fn axis_bounds(&self, slot: u32, axis: u32) -> (i64, i64);

    fn axis_exists(&self, slot: u32, axis: u32) -> bool;

    fn button_count(&self, slot: u32) -> u32;

    /// Number of continuous hats
    fn hat_count(&self, slot: u32) -> u32;

    fn set_axis(&self, slot: u32, axis: u32, raw_value: i64) -> bool;

    fn set_button(&self, slot: u32, button: u32, pressed: bool) -> bool;

    /// `direction_code` is 0..=3 clockwise from north, -1 when centered
    fn set_hat_discrete(&self, slot: u32, hat: u32, direction_code: i32) -> bool;

    /// `angle_hundredths` is 0..36000 clockwise from north, -1 when centered
    fn set_hat_continuous(&self, slot: u32, hat: u32, angle_hundredths: i32) -> bool;
}

/// Validated handle to the driver, shared by every virtual device.
///
/// Creating the handle checks once that the driver is running and has the
/// expected version.
#[derive(Clone)]
pub struct DriverHandle {
    driver: Arc<dyn VJoyDriver>,
    version: DriverVersion,
}

impl DriverHandle {
    pub fn open(
        driver: Arc<dyn VJoyDriver>,
        required: DriverVersion,
    ) -> Result<Self, DriverError> {
        if !driver.is_driver_running() {
            return Err(DriverError::NotRunning);
        }

        let found = driver.driver_version();
        if found != required {
            return Err(DriverError::VersionMismatch { found, required });
        }

        info!("✓ Virtual joystick driver {} is running", found);
        Ok(Self {
            driver,
            version: found,
        })
    }

    pub fn version(&self) -> DriverVersion {
        self.version
    }

    pub fn driver(&self) -> &Arc<dyn VJoyDriver> {
        &self.driver
    }

    /// Status of every slot in `1..=max_slots`, capped at [`MAX_SLOTS`]
    pub fn slot_statuses(&self, max_slots: u32) -> Vec<(u32, SlotStatus)> {
        let statuses: Vec<_> = (1..=max_slots.min(MAX_SLOTS))
            .map(|slot| (slot, self.driver.slot_status(slot)))
            .collect();
        debug!("Slot statuses: {:?}", statuses);
        statuses
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("version", &self.version)
            .finish()
    }
}
