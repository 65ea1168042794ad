use crate::hal::SensorsEvent;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// Standard gravity (m/s²)
pub const GRAVITY_EARTH: f32 = 9.80665;

/// Handles, as reported in `sensor_t::handle` and `sensors_event_t::sensor`
pub const ID_A: i32 = 0;
pub const ID_P: i32 = 3;
pub const ID_L: i32 = 4;

/// Version tag carried by every event: the size of the C record
pub const SENSORS_EVENT_VERSION: i32 = size_of::<SensorsEvent>() as i32;

/// Android sensor type tags used by this module
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Accelerometer,
    Light,
    Proximity,
}

impl SensorType {
    pub fn code(&self) -> i32 {
        match self {
            SensorType::Accelerometer => 1,
            SensorType::Light => 5,
            SensorType::Proximity => 8,
        }
    }
}

/// Event payload; which variant is valid follows from the sensor type
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    /// Acceleration (m/s²)
    Acceleration { x: f32, y: f32, z: f32 },
    /// Distance (cm); the TMD27711 only reports near (0) or far (5)
    Distance(f32),
    /// Illuminance (lux)
    Light(f32),
}

/// One sensor event as produced by a driver
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SensorEvent {
    pub version: i32,
    pub sensor: i32,
    pub sensor_type: SensorType,
    /// CLOCK_MONOTONIC or kernel input timestamp (ns)
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl SensorEvent {
    pub fn acceleration(x: f32, y: f32, z: f32) -> Self {
        Self::new(ID_A, SensorType::Accelerometer, EventPayload::Acceleration { x, y, z })
    }

    pub fn proximity(distance: f32) -> Self {
        Self::new(ID_P, SensorType::Proximity, EventPayload::Distance(distance))
    }

    pub fn light(lux: f32) -> Self {
        Self::new(ID_L, SensorType::Light, EventPayload::Light(lux))
    }

    fn new(sensor: i32, sensor_type: SensorType, payload: EventPayload) -> Self {
        Self {
            version: SENSORS_EVENT_VERSION,
            sensor,
            sensor_type,
            timestamp: 0,
            payload,
        }
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// CLOCK_MONOTONIC in nanoseconds, the time base of Android sensor events
pub fn monotonic_now_ns() -> i64 {
    use nix::time::{clock_gettime, ClockId};

    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map(|ts| ts.tv_sec() as i64 * 1_000_000_000 + ts.tv_nsec() as i64)
        .unwrap_or(0)
}
