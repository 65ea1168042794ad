use crate::config::HalConfig;
use crate::errors::SensorResult;
use crate::messages::SensorEvent;
use crate::registry::SensorDescriptor;
use std::os::fd::RawFd;

#[cfg(feature = "bma222")]
pub mod bma222;
#[cfg(feature = "tmd27711")]
pub mod tmd27711;

/// A HAL driver owning one chip, exposing one or more sensor handles
pub trait SensorDriver: Send {
    fn name(&self) -> &str;

    /// Sensor handles served by this driver
    fn handles(&self) -> &'static [i32];

    fn enable(&mut self, handle: i32, enabled: bool) -> SensorResult<()>;

    fn is_enabled(&self, handle: i32) -> bool;

    fn set_delay(&mut self, handle: i32, delay_ns: i64) -> SensorResult<()>;

    /// Appends at most `count` events to `out` and returns how many were added
    fn read_events(&mut self, out: &mut Vec<SensorEvent>, count: usize) -> SensorResult<usize>;

    fn has_pending_events(&self) -> bool;

    /// Descriptor to poll on, if the input device could be opened
    fn fd(&self) -> Option<RawFd>;
}

pub trait SensorFactory: Sync {
    fn name(&self) -> &'static str;
    fn descriptors(&self) -> &'static [SensorDescriptor];
    fn create(&self, config: &HalConfig) -> SensorResult<Box<dyn SensorDriver>>;
}

#[cfg(feature = "bma222")]
pub use self::bma222::BMA222_FACTORY;
#[cfg(feature = "tmd27711")]
pub use self::tmd27711::TMD27711_FACTORY;

pub static SENSOR_FACTORIES: &[&dyn SensorFactory] = &[
    #[cfg(feature = "bma222")]
    &BMA222_FACTORY,
    #[cfg(feature = "tmd27711")]
    &TMD27711_FACTORY,
];
