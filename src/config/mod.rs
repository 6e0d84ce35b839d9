// src/config/mod.rs - Panel configuration
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration for the tuning panel host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tuning: TuningConfig,

    #[serde(default)]
    pub web: WebConfig,
}

/// Tuning-panel behavior knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TuningConfig {
    /// Maximum sample age kept in the plot buffers, in minutes.
    #[serde(default = "default_temperature_cutoff")]
    pub temperature_cutoff: u32,

    /// Target-temperature view default when a tool heater is selected.
    #[serde(default = "default_tool_target")]
    pub tool_target: f64,

    /// Target-temperature view default when the bed is selected.
    #[serde(default = "default_bed_target")]
    pub bed_target: f64,

    /// Increment applied by the step-target buttons.
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Autotune cycle count when the operator does not override it.
    #[serde(default = "default_autotune_cycles")]
    pub autotune_cycles: u32,

    /// Track running min/max of the primary channel's actual temperature.
    #[serde(default)]
    pub track_extrema: bool,

    /// Include the fan-speed series in the plot projection.
    #[serde(default = "default_fan_series")]
    pub fan_series: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            temperature_cutoff: default_temperature_cutoff(),
            tool_target: default_tool_target(),
            bed_target: default_bed_target(),
            step_size: default_step_size(),
            autotune_cycles: default_autotune_cycles(),
            track_extrema: false,
            fan_series: default_fan_series(),
        }
    }
}

/// Web interface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            bind_address: default_bind_address(),
        }
    }
}

// Default value functions
fn default_temperature_cutoff() -> u32 {
    30
}
fn default_tool_target() -> f64 {
    284.0
}
fn default_bed_target() -> f64 {
    110.0
}
fn default_step_size() -> f64 {
    10.0
}
fn default_autotune_cycles() -> u32 {
    8
}
fn default_fan_series() -> bool {
    true
}
fn default_web_port() -> u16 {
    3000
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    let config = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tuning.temperature_cutoff, 30);
        assert_eq!(config.tuning.tool_target, 284.0);
        assert_eq!(config.tuning.bed_target, 110.0);
        assert_eq!(config.tuning.autotune_cycles, 8);
        assert!(config.tuning.fan_series);
        assert!(!config.tuning.track_extrema);
        assert_eq!(config.web.port, 3000);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_config = r#"
[tuning]
temperature_cutoff = 15
track_extrema = true

[web]
port = 8080
"#;
        let config: Config = toml::from_str(toml_config).unwrap();
        assert_eq!(config.tuning.temperature_cutoff, 15);
        assert!(config.tuning.track_extrema);
        // Untouched keys keep their defaults.
        assert_eq!(config.tuning.step_size, 10.0);
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tuning.autotune_cycles, 8);
        assert_eq!(config.web.port, 3000);
    }
}
