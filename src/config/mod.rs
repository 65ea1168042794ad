pub mod sensor_config;

pub use sensor_config::{AccelerometerConfig, ProximityLightConfig};

use crate::errors::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "SENSORS_HAL_CONFIG";

/// Config file picked up when present on the device
pub const DEFAULT_CONFIG_PATH: &str = "/system/etc/sensors_hal.toml";

/// `[paths]` section: where the kernel exposes input devices
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub input_class_dir: PathBuf,
    pub dev_input_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_class_dir: PathBuf::from("/sys/class/input"),
            dev_input_dir: PathBuf::from("/dev/input"),
        }
    }
}

/// Root configuration. Every field falls back to the production value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HalConfig {
    pub paths: PathsConfig,
    pub accelerometer: AccelerometerConfig,
    pub proximity_light: ProximityLightConfig,
}

impl HalConfig {
    fn validate(self) -> ConfigResult<Self> {
        if self.accelerometer.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "accelerometer.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.proximity_light.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "proximity_light.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(self)
    }
}

/// Parses a config document
pub fn parse_hal_config(content: &str) -> ConfigResult<HalConfig> {
    let parsed: HalConfig = toml::from_str(content)?;
    parsed.validate()
}

/// Loads config from a TOML file
pub fn load_hal_config<P: AsRef<Path>>(path: P) -> ConfigResult<HalConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_hal_config(&content)
}

/// Resolves the active config: `$SENSORS_HAL_CONFIG`, then the system file, then defaults
pub fn load_default_config() -> ConfigResult<HalConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        info!("[config] loading {} from ${}", path, CONFIG_ENV);
        return load_hal_config(path);
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        info!("[config] loading {}", DEFAULT_CONFIG_PATH);
        return load_hal_config(DEFAULT_CONFIG_PATH);
    }
    debug!("[config] no config file, using built-in defaults");
    Ok(HalConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TempDir;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse_hal_config("").unwrap();
        assert_eq!(config, HalConfig::default());
        assert_eq!(config.paths.input_class_dir, PathBuf::from("/sys/class/input"));
        assert_eq!(config.accelerometer.name, "bma222");
        assert_eq!(config.proximity_light.control_device, "/dev/tmd27711");
    }

    #[test]
    fn test_partial_override() {
        let config = parse_hal_config(
            r#"
            [paths]
            input_class_dir = "/tmp/fake-sys"

            [proximity_light]
            control_device = "/dev/taos"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.input_class_dir, PathBuf::from("/tmp/fake-sys"));
        assert_eq!(config.paths.dev_input_dir, PathBuf::from("/dev/input"));
        assert_eq!(config.proximity_light.control_device, "/dev/taos");
        assert_eq!(config.proximity_light.name, "tmd27711");
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = parse_hal_config("[accelerometer]\nname = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "accelerometer.name"));
    }

    #[test]
    fn test_malformed_document() {
        let err = parse_hal_config("[paths\n").unwrap_err();
        assert!(matches!(err, ConfigError::FormatError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new("config");
        let path = dir.path().join("sensors_hal.toml");
        fs::write(&path, "[accelerometer]\nname = \"bma250\"\n").unwrap();

        let config = load_hal_config(&path).unwrap();
        assert_eq!(config.accelerometer.name, "bma250");

        let missing = load_hal_config(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::LoadError { .. }));
    }
}
