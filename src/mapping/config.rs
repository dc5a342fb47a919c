//! Configuration loader and validator
//!
//! Loads the remapping configuration from TOML files in the configs/ directory.

use crate::driver::{DriverVersion, MAX_SLOTS};
use crate::transform::{Calibration, CurveKind, Deadzone, InputRangeError, ResponseCurve};
use crate::vjoy::{AxisName, HatDirection};
use crate::device::DEFAULT_VIRTUAL_DEVICE_NAME;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use log::{info, debug, warn};

/// Input events coming from physical devices, keyed by device name
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Raw axis sample, calibrated by the binding
    AxisMoved { device: String, axis: u32, raw: f64 },
    ButtonChanged { device: String, button: u32, pressed: bool },
    HatChanged { device: String, hat: u32, direction: HatDirection },
}

impl InputEvent {
    pub fn device(&self) -> &str {
        match self {
            InputEvent::AxisMoved { device, .. }
            | InputEvent::ButtonChanged { device, .. }
            | InputEvent::HatChanged { device, .. } => device,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Physical axis -> virtual axis
    #[serde(default)]
    pub axes: Vec<AxisBinding>,

    /// Physical axis window -> virtual button
    #[serde(default)]
    pub axis_buttons: Vec<AxisButtonBinding>,

    /// Physical button -> virtual button
    #[serde(default)]
    pub buttons: Vec<ButtonBinding>,

    /// Physical hat -> virtual hat
    #[serde(default)]
    pub hats: Vec<HatBinding>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds a virtual device may stay idle before a keep-alive write
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Virtual slots scanned during matching (1..=16)
    #[serde(default = "default_max_slots")]
    pub max_slots: u32,

    /// Driver version this configuration expects
    #[serde(default = "default_driver_version")]
    pub driver_version: u32,

    /// Device name that marks an enumerated device as virtual
    #[serde(default = "default_virtual_device_name")]
    pub virtual_device_name: String,

    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
            max_slots: default_max_slots(),
            driver_version: default_driver_version(),
            virtual_device_name: default_virtual_device_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_keep_alive_secs() -> u64 { 60 }
fn default_max_slots() -> u32 { MAX_SLOTS }
fn default_driver_version() -> u32 { 0x218 }
fn default_virtual_device_name() -> String { DEFAULT_VIRTUAL_DEVICE_NAME.to_string() }
fn default_log_level() -> String { "info".to_string() }

/// Raw range of a physical axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRange {
    pub minimum: f64,
    pub center: f64,
    pub maximum: f64,
}

impl CalibrationRange {
    /// Picks axis or slider calibration once for this binding
    pub fn build(&self) -> Result<Calibration, InputRangeError> {
        Calibration::select(self.minimum, self.center, self.maximum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadzoneRange {
    pub low: f64,
    pub low_center: f64,
    pub high_center: f64,
    pub high: f64,
}

impl DeadzoneRange {
    pub fn build(&self) -> Result<Deadzone, InputRangeError> {
        Deadzone::new(self.low, self.low_center, self.high_center, self.high)
    }
}

/// Response curve control points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveConfig {
    pub kind: CurveKind,
    pub points: Vec<[f64; 2]>,
}

impl CurveConfig {
    pub fn build(&self) -> Result<ResponseCurve, InputRangeError> {
        let points: Vec<(f64, f64)> = self.points.iter().map(|p| (p[0], p[1])).collect();
        ResponseCurve::from_points(self.kind, &points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisBinding {
    pub device: String,
    pub input: u32,
    pub slot: u32,
    /// 1-based virtual axis index (1 = X ... 8 = SL1)
    pub output: u32,

    /// Omitted when the device already reports values in [-1, 1]
    #[serde(default)]
    pub calibration: Option<CalibrationRange>,

    #[serde(default)]
    pub deadzone: Option<DeadzoneRange>,

    #[serde(default)]
    pub curve: Option<CurveConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisButtonBinding {
    pub device: String,
    pub input: u32,

    #[serde(default)]
    pub calibration: Option<CalibrationRange>,

    /// Window in calibrated units; the button is pressed while inside it
    pub lower: f64,
    pub upper: f64,

    pub slot: u32,
    pub output: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub device: String,
    pub input: u32,
    pub slot: u32,
    pub output: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatBinding {
    pub device: String,
    pub input: u32,
    pub slot: u32,
    pub output: u32,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::from_toml(&content)?;

        info!("✓ Config validation passed");
        Ok(config)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        info!("✓ Config parsed successfully");
        debug!("  - Axis bindings: {}", config.axes.len());
        debug!("  - Axis button bindings: {}", config.axis_buttons.len());
        debug!("  - Button bindings: {}", config.buttons.len());
        debug!("  - Hat bindings: {}", config.hats.len());

        config.validate()?;
        Ok(config)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.settings.keep_alive_secs)
    }

    pub fn driver_version(&self) -> DriverVersion {
        DriverVersion(self.settings.driver_version)
    }

    /// Every virtual slot some binding writes to
    pub fn slots(&self) -> BTreeSet<u32> {
        self.axes.iter().map(|b| b.slot)
            .chain(self.axis_buttons.iter().map(|b| b.slot))
            .chain(self.buttons.iter().map(|b| b.slot))
            .chain(self.hats.iter().map(|b| b.slot))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "keep_alive_secs must be greater than 0".into()
            ));
        }

        if self.settings.max_slots == 0 || self.settings.max_slots > MAX_SLOTS {
            return Err(ConfigError::Invalid(
                format!("max_slots must be between 1 and {}", MAX_SLOTS)
            ));
        }

        if self.settings.virtual_device_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "virtual_device_name cannot be empty".into()
            ));
        }

        let mut axis_targets = HashSet::new();
        for (i, binding) in self.axes.iter().enumerate() {
            let context = format!("axes[{}]", i);
            self.validate_endpoints(&binding.device, binding.input, binding.slot, &context)?;

            if AxisName::from_index(binding.output).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{}: output axis must be between 1 and {}, got {}",
                    context, AxisName::ALL.len(), binding.output
                )));
            }
            if !axis_targets.insert((binding.slot, binding.output)) {
                return Err(ConfigError::Invalid(format!(
                    "{}: virtual axis {} on slot {} is already bound",
                    context, binding.output, binding.slot
                )));
            }

            if let Some(calibration) = &binding.calibration {
                calibration.build().map_err(|e| range_error(&context, e))?;
            }
            if let Some(deadzone) = &binding.deadzone {
                deadzone.build().map_err(|e| range_error(&context, e))?;
            }
            if let Some(curve) = &binding.curve {
                curve.build().map_err(|e| range_error(&context, e))?;
            }
        }

        let mut button_targets = HashSet::new();
        for (i, binding) in self.axis_buttons.iter().enumerate() {
            let context = format!("axis_buttons[{}]", i);
            self.validate_endpoints(&binding.device, binding.input, binding.slot, &context)?;
            validate_output(binding.output, &context)?;

            if !binding.lower.is_finite() || !binding.upper.is_finite() {
                return Err(ConfigError::Invalid(
                    format!("{}: window limits must be finite", context)
                ));
            }
            if let Some(calibration) = &binding.calibration {
                calibration.build().map_err(|e| range_error(&context, e))?;
            }
            if !button_targets.insert((binding.slot, binding.output)) {
                warn!(
                    "{}: virtual button {} on slot {} has several sources",
                    context, binding.output, binding.slot
                );
            }
        }

        for (i, binding) in self.buttons.iter().enumerate() {
            let context = format!("buttons[{}]", i);
            self.validate_endpoints(&binding.device, binding.input, binding.slot, &context)?;
            validate_output(binding.output, &context)?;
            if !button_targets.insert((binding.slot, binding.output)) {
                warn!(
                    "{}: virtual button {} on slot {} has several sources",
                    context, binding.output, binding.slot
                );
            }
        }

        for (i, binding) in self.hats.iter().enumerate() {
            let context = format!("hats[{}]", i);
            self.validate_endpoints(&binding.device, binding.input, binding.slot, &context)?;
            validate_output(binding.output, &context)?;
        }

        if self.slots().is_empty() {
            warn!("Configuration contains no bindings");
        }

        Ok(())
    }

    fn validate_endpoints(
        &self,
        device: &str,
        input: u32,
        slot: u32,
        context: &str,
    ) -> Result<(), ConfigError> {
        if device.trim().is_empty() {
            return Err(ConfigError::Invalid(
                format!("{}: device name cannot be empty", context)
            ));
        }
        if input == 0 {
            return Err(ConfigError::Invalid(
                format!("{}: input index is 1-based", context)
            ));
        }
        if slot == 0 || slot > self.settings.max_slots {
            return Err(ConfigError::Invalid(format!(
                "{}: slot must be between 1 and {}, got {}",
                context, self.settings.max_slots, slot
            )));
        }
        Ok(())
    }
}

fn validate_output(output: u32, context: &str) -> Result<(), ConfigError> {
    if output == 0 {
        return Err(ConfigError::Invalid(
            format!("{}: output index is 1-based", context)
        ));
    }
    Ok(())
}

fn range_error(context: &str, err: InputRangeError) -> ConfigError {
    ConfigError::Invalid(format!("{}: {}", context, err))
}
