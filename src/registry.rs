use crate::config::HalConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::messages::SensorType;
use crate::poll::PollContext;
use crate::sensors::{SensorDriver, SENSOR_FACTORIES};
use std::ffi::CStr;
use std::sync::OnceLock;
use tracing::{error, info};

/// Static description of one sensor, as listed to the framework
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDescriptor {
    pub name: &'static CStr,
    pub vendor: &'static CStr,
    pub version: i32,
    pub handle: i32,
    pub sensor_type: SensorType,
    /// Maximum value in SI units
    pub max_range: f32,
    pub resolution: f32,
    /// Current draw while active (mA)
    pub power: f32,
    /// Minimum sampling period (µs); 0 for on-change sensors
    pub min_delay: i32,
}

/// Every sensor of every compiled-in driver
pub fn sensor_list() -> &'static [SensorDescriptor] {
    static LIST: OnceLock<Vec<SensorDescriptor>> = OnceLock::new();
    LIST.get_or_init(|| {
        SENSOR_FACTORIES
            .iter()
            .flat_map(|f| f.descriptors().iter().copied())
            .collect()
    })
}

/// Builds every driver and hands them to a fresh poll context.
///
/// A driver that cannot be created is logged and left out; its handles
/// then answer `-EINVAL`.
pub fn init_all(config: &HalConfig) -> RegistryResult<PollContext> {
    let mut drivers: Vec<Box<dyn SensorDriver>> = Vec::new();
    info!("[registry] initializing {} driver(s)...", SENSOR_FACTORIES.len());
    for factory in SENSOR_FACTORIES.iter() {
        match factory.create(config) {
            Ok(driver) => {
                info!(
                    "[registry] registered driver={} handles={:?}",
                    factory.name(),
                    driver.handles()
                );
                drivers.push(driver);
            }
            Err(e) => {
                let err = RegistryError::DriverCreationError {
                    driver: factory.name(),
                    source: e,
                };
                error!("[registry] {}", err);
            }
        }
    }

    PollContext::new(drivers).map_err(RegistryError::PollSetupError)
}
