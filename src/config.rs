//! Machine configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default values for every configuration field.
pub mod defaults {
    /// Memory-mapped output cell.
    pub const OUTPUT_ADDR: u16 = 0xFFF0;
    /// Memory-mapped input cell.
    pub const INPUT_ADDR: u16 = 0xFFF1;
    /// Where programs are loaded.
    pub const LOAD_OFFSET: u16 = 0x0000;
    /// Tick limit for `run`.
    pub const MAX_TICKS: u64 = 1_000_000;
}

/// Memory map and run limits of a [`Machine`](crate::Machine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Output cell; a new nonzero value emits its low byte.
    #[serde(default = "MachineConfig::default_output_addr")]
    pub output_addr: u16,

    /// Input cell written by `feed_input`.
    #[serde(default = "MachineConfig::default_input_addr")]
    pub input_addr: u16,

    /// Load address used by the CLI and debugger.
    #[serde(default = "MachineConfig::default_load_offset")]
    pub load_offset: u16,

    /// Tick limit for a full run.
    #[serde(default = "MachineConfig::default_max_ticks")]
    pub max_ticks: u64,
}

impl MachineConfig {
    fn default_output_addr() -> u16 {
        defaults::OUTPUT_ADDR
    }

    fn default_input_addr() -> u16 {
        defaults::INPUT_ADDR
    }

    fn default_load_offset() -> u16 {
        defaults::LOAD_OFFSET
    }

    fn default_max_ticks() -> u64 {
        defaults::MAX_TICKS
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.output_addr == self.input_addr {
            return Err(ConfigError::Invalid(format!(
                "output and input share cell {:#06x}",
                self.output_addr
            )));
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            output_addr: defaults::OUTPUT_ADDR,
            input_addr: defaults::INPUT_ADDR,
            load_offset: defaults::LOAD_OFFSET,
            max_ticks: defaults::MAX_TICKS,
        }
    }
}

/// Errors from loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = MachineConfig::from_json("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.output_addr, 0xFFF0);
        assert_eq!(config.input_addr, 0xFFF1);
    }

    #[test]
    fn test_partial_override() {
        let config = MachineConfig::from_json(r#"{ "max_ticks": 50, "load_offset": 256 }"#).unwrap();
        assert_eq!(config.max_ticks, 50);
        assert_eq!(config.load_offset, 0x100);
        assert_eq!(config.output_addr, defaults::OUTPUT_ADDR);
    }

    #[test]
    fn test_rejects_shared_io_cell() {
        let err = MachineConfig::from_json(r#"{ "input_addr": 65520 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MachineConfig { max_ticks: 7, ..Default::default() };
        let text = config.to_json().unwrap();
        assert_eq!(MachineConfig::from_json(&text).unwrap(), config);
    }
}
