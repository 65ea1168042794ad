use thiserror::Error;

/// Errors raised by the drivers and the device plumbing underneath them
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("I/O on '{path}' failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sensor '{sensor}' has no sysfs class path")]
    NoClassPath { sensor: String },

    #[error("Sensor '{sensor}' has no input device")]
    NoDevice { sensor: String },

    #[error("Input device '{path}' went away")]
    Disconnected { path: String },

    #[error("ioctl {command} on '{sensor}' failed: {source}")]
    Ioctl {
        sensor: String,
        command: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown sensor handle {handle}")]
    UnknownHandle { handle: i32 },

    #[error("Short read from input device: {len} bytes is not a whole number of events")]
    PartialEvent { len: usize },

    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),
}

impl SensorError {
    /// Negative errno reported across the HAL boundary
    pub fn errno(&self) -> i32 {
        let code = match self {
            SensorError::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            SensorError::Ioctl { source, .. } | SensorError::Poll(source) => *source as i32,
            SensorError::NoDevice { .. } | SensorError::Disconnected { .. } => libc::ENODEV,
            SensorError::NoClassPath { .. }
            | SensorError::InvalidArgument(_)
            | SensorError::UnknownHandle { .. }
            | SensorError::PartialEvent { .. } => libc::EINVAL,
        };
        -code
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Registry and initialization errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to create sensor driver '{driver}': {source}")]
    DriverCreationError {
        driver: &'static str,
        #[source]
        source: SensorError,
    },

    #[error("Poll context setup failed: {0}")]
    PollSetupError(#[source] SensorError),

    #[error("Configuration failed: {0}")]
    Config(#[from] ConfigError),
}

impl RegistryError {
    pub fn errno(&self) -> i32 {
        match self {
            RegistryError::DriverCreationError { source, .. }
            | RegistryError::PollSetupError(source) => source.errno(),
            RegistryError::Config(_) => -libc::EINVAL,
        }
    }
}

/// Result type aliases for convenience
pub type SensorResult<T> = Result<T, SensorError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
