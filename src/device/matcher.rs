//! Binding virtual input devices to driver slots.
//!
//! The driver cannot say which input device belongs to which slot, so the
//! only correlation key is the capability signature. Each slot is examined by
//! acquiring it, its signature is compared against the virtual descriptors,
//! and every opened slot is released again afterwards. Correctness depends
//! on signatures being unique on the machine; anything else fails closed.

use super::descriptor::{CapabilitySignature, DeviceDescriptor};
use crate::driver::{DriverHandle, SlotStatus};
use crate::vjoy::VirtualDevice;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error(
        "Indistinguishable virtual devices present: {} share signature {signature}",
        .names.join(", ")
    )]
    IndistinguishableDevices {
        signature: CapabilitySignature,
        names: Vec<String>,
    },

    #[error("Unable to match virtual device slots to input devices: {}", format_slots(.slots))]
    UnmatchedSlots {
        slots: Vec<(u32, CapabilitySignature)>,
    },

    #[error("Virtual device slots {first} and {second} both match {device} {signature}")]
    SlotConflict {
        first: u32,
        second: u32,
        device: String,
        signature: CapabilitySignature,
    },
}

fn format_slots(slots: &[(u32, CapabilitySignature)]) -> String {
    slots
        .iter()
        .map(|(slot, signature)| format!("slot {} {}", slot, signature))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A virtual descriptor bound to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    pub slot: u32,
    /// Position of the descriptor in the matched slice
    pub descriptor: usize,
}

impl fmt::Display for SlotBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} -> device #{}", self.slot, self.descriptor)
    }
}

/// Signature of an opened slot.
///
/// Every axis is registered under both its name and its index, so the key
/// count is halved to get the number of axes. This mirrors how the driver
/// double-counts axes and has to be re-verified against new driver releases.
pub fn slot_signature(device: &VirtualDevice) -> CapabilitySignature {
    CapabilitySignature::new(
        (device.axis_key_count() / 2) as u32,
        device.button_count() as u32,
        device.hat_count() as u32,
    )
}

/// Binds every virtual descriptor to the driver slot with the same
/// signature, probing slots `1..=max_slots`.
///
/// Nothing is assigned unless the whole binding succeeds.
pub fn match_virtual_devices(
    handle: &DriverHandle,
    descriptors: &mut [DeviceDescriptor],
    max_slots: u32,
) -> Result<Vec<SlotBinding>, ConfigurationError> {
    let lookup = signature_lookup(descriptors)?;

    let mut opened = Vec::new();
    let mut bindings: Vec<SlotBinding> = Vec::new();
    let mut unmatched = Vec::new();
    let mut conflict = None;

    for (slot, status) in handle.slot_statuses(max_slots) {
        match status {
            SlotStatus::Free => {}
            SlotStatus::Missing => {
                debug!("Skipping slot {}: not configured", slot);
                continue;
            }
            SlotStatus::Busy => {
                warn!("Skipping slot {}: owned by another feeder", slot);
                continue;
            }
        }

        let device = match VirtualDevice::acquire(handle, slot) {
            Ok(device) => device,
            Err(e) => {
                warn!("Skipping slot {}: present but unusable: {}", slot, e);
                continue;
            }
        };

        let signature = slot_signature(&device);
        opened.push(device);

        match lookup.get(&signature) {
            Some(&index) => {
                if let Some(previous) = bindings.iter().find(|b| b.descriptor == index) {
                    warn!(
                        "Slot {} and slot {} both match {}",
                        previous.slot, slot, descriptors[index]
                    );
                    conflict.get_or_insert(ConfigurationError::SlotConflict {
                        first: previous.slot,
                        second: slot,
                        device: descriptors[index].name().to_string(),
                        signature,
                    });
                } else {
                    debug!("Slot {} {} matches {}", slot, signature, descriptors[index]);
                    bindings.push(SlotBinding {
                        slot,
                        descriptor: index,
                    });
                }
            }
            None => {
                warn!("Slot {} {} matches no input device", slot, signature);
                unmatched.push((slot, signature));
            }
        }
    }

    // Don't hold slots nobody uses
    for mut device in opened {
        if let Err(e) = device.invalidate() {
            warn!("Error releasing scanned slot {}: {}", device.slot(), e);
        }
    }

    if let Some(err) = conflict {
        return Err(err);
    }
    if !unmatched.is_empty() {
        return Err(ConfigurationError::UnmatchedSlots { slots: unmatched });
    }

    for binding in &bindings {
        descriptors[binding.descriptor].assign_vjoy_id(binding.slot);
        info!("✓ {} bound to virtual slot {}", descriptors[binding.descriptor], binding.slot);
    }
    Ok(bindings)
}

/// Maps each virtual signature to its descriptor, rejecting duplicates
fn signature_lookup(
    descriptors: &[DeviceDescriptor],
) -> Result<HashMap<CapabilitySignature, usize>, ConfigurationError> {
    let mut lookup = HashMap::new();
    for (index, descriptor) in descriptors.iter().enumerate() {
        if !descriptor.is_virtual() {
            continue;
        }

        let signature = descriptor.signature();
        if let Some(&existing) = lookup.get(&signature) {
            let existing: &DeviceDescriptor = &descriptors[existing];
            return Err(ConfigurationError::IndistinguishableDevices {
                signature,
                names: vec![existing.to_string(), descriptor.to_string()],
            });
        }
        lookup.insert(signature, index);
    }
    Ok(lookup)
}
