use serde::Deserialize;

/// `[accelerometer]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccelerometerConfig {
    /// Contents of `/sys/class/input/inputN/name` identifying the chip
    pub name: String,
}

impl Default for AccelerometerConfig {
    fn default() -> Self {
        Self { name: "bma222".to_string() }
    }
}

/// `[proximity_light]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProximityLightConfig {
    pub name: String,
    /// Character device accepting the TAOS ioctl command set
    pub control_device: String,
}

impl Default for ProximityLightConfig {
    fn default() -> Self {
        Self {
            name: "tmd27711".to_string(),
            control_device: "/dev/tmd27711".to_string(),
        }
    }
}
