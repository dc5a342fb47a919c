//! Mapping module - routes physical inputs to virtual device controls

pub mod axis_button;
pub mod config;
pub mod executor;

pub use axis_button::{AxisButton, EdgeEvent};
pub use config::{Config, ConfigError, InputEvent};
pub use executor::{ExecutorError, MappingExecutor};
