// Public modules
pub mod bus;
pub mod config;
pub mod errors;
pub mod hal;
pub mod messages;
pub mod poll;
pub mod registry;
pub mod sensors;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use config::{load_default_config, load_hal_config, HalConfig};
pub use errors::{SensorError, SensorResult};
pub use messages::{SensorEvent, SensorType};
pub use poll::{PollContext, Waker};
pub use registry::{init_all, sensor_list, SensorDescriptor};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Like `init_tracing`, but leaves an already installed subscriber alone.
/// The HAL entry point runs inside a host process that may own one.
pub fn try_init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .try_init();
}
