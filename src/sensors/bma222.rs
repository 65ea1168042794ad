//! Bosch BMA222 3-axis accelerometer, controlled through sysfs.

use super::{SensorDriver, SensorFactory};
use crate::bus::input::{open_event_device, InputEventReader, ABS_X, ABS_Y, ABS_Z, EV_ABS, EV_SYN};
use crate::bus::sysfs::SysfsDevice;
use crate::config::HalConfig;
use crate::errors::{SensorError, SensorResult};
use crate::messages::{monotonic_now_ns, SensorEvent, SensorType, GRAVITY_EARTH, ID_A};
use crate::registry::SensorDescriptor;
use std::os::fd::RawFd;
use tracing::{debug, error, info, trace, warn};

/// m/s² per LSB at the ±2g range (256 LSB/g)
const CONVERT: f32 = GRAVITY_EARTH / 256.0;

const INPUT_BUFFER_EVENTS: usize = 4;

pub const DESCRIPTORS: &[SensorDescriptor] = &[SensorDescriptor {
    name: c"BMA222 3-axis Accelerometer",
    vendor: c"BOSCH Sensortec",
    version: 1,
    handle: ID_A,
    sensor_type: SensorType::Accelerometer,
    max_range: 4.0 * 9.81,
    resolution: (4.0 * 9.81) / 256.0,
    power: 0.2,
    min_delay: 0,
}];

pub struct Bma222 {
    sysfs: SysfsDevice,
    input: Option<InputEventReader>,
    enabled: bool,
    enabled_time: i64,
    /// Axis values of the batch being assembled
    axes: [f32; 3],
    /// Last complete sample, replayed when the sensor is switched on
    last_sample: Option<[f32; 3]>,
    pending: Option<SensorEvent>,
}

impl Bma222 {
    pub fn new(sysfs: SysfsDevice, input: Option<InputEventReader>) -> Self {
        Self {
            sysfs,
            input,
            enabled: false,
            enabled_time: 0,
            axes: [0.0; 3],
            last_sample: None,
            pending: None,
        }
    }

    /// Resolves the class path and opens the matching evdev node.
    ///
    /// Neither failing is fatal: writes then fail with `-EINVAL` and reads
    /// with `-ENODEV`.
    pub fn open(config: &HalConfig) -> Self {
        let sysfs = SysfsDevice::discover(&config.paths.input_class_dir, &config.accelerometer.name);
        let input = match sysfs.event_device(&config.paths.dev_input_dir) {
            Some(node) => match open_event_device(&node) {
                Ok(file) => {
                    info!("[bma222] input device {}", node.display());
                    Some(InputEventReader::new(
                        Box::new(file),
                        node.display().to_string(),
                        INPUT_BUFFER_EVENTS,
                    ))
                }
                Err(e) => {
                    error!("[bma222] {}", e);
                    None
                }
            },
            None => {
                warn!("[bma222] no input device for '{}'", sysfs.name());
                None
            }
        };
        Self::new(sysfs, input)
    }

    pub fn enabled_time(&self) -> i64 {
        self.enabled_time
    }
}

impl SensorDriver for Bma222 {
    fn name(&self) -> &str {
        "bma222"
    }

    fn handles(&self) -> &'static [i32] {
        &[ID_A]
    }

    fn enable(&mut self, _handle: i32, enabled: bool) -> SensorResult<()> {
        if enabled == self.enabled {
            return Ok(());
        }

        self.sysfs.write("enable", if enabled { "1" } else { "0" })?;
        self.enabled = enabled;
        if enabled {
            self.enabled_time = monotonic_now_ns();
            if let Some([x, y, z]) = self.last_sample {
                self.pending = Some(SensorEvent::acceleration(x, y, z));
            }
        } else {
            self.pending = None;
        }
        debug!("[bma222] enabled={}", enabled);
        Ok(())
    }

    fn is_enabled(&self, _handle: i32) -> bool {
        self.enabled
    }

    fn set_delay(&mut self, _handle: i32, delay_ns: i64) -> SensorResult<()> {
        if delay_ns < 0 {
            return Err(SensorError::InvalidArgument(format!("negative delay {}ns", delay_ns)));
        }
        let delay_ms = delay_ns / 1_000_000;
        self.sysfs.write("delay", &delay_ms.to_string())?;
        debug!("[bma222] delay={}ms", delay_ms);
        Ok(())
    }

    fn read_events(&mut self, out: &mut Vec<SensorEvent>, count: usize) -> SensorResult<usize> {
        if count < 1 {
            return Err(SensorError::InvalidArgument("event count must be at least 1".to_string()));
        }

        if let Some(mut event) = self.pending.take() {
            event.timestamp = monotonic_now_ns();
            if !self.enabled {
                return Ok(0);
            }
            out.push(event);
            return Ok(1);
        }

        let reader = self.input.as_mut().ok_or_else(|| SensorError::NoDevice {
            sensor: self.sysfs.name().to_string(),
        })?;
        reader.fill()?;

        let mut received = 0;
        while received < count {
            let Some(event) = reader.peek().copied() else {
                break;
            };
            match event.kind {
                EV_ABS => match event.code {
                    ABS_X => self.axes[0] = event.value as f32 * CONVERT,
                    ABS_Y => self.axes[1] = event.value as f32 * CONVERT,
                    ABS_Z => self.axes[2] = event.value as f32 * CONVERT,
                    _ => {}
                },
                EV_SYN => {
                    self.last_sample = Some(self.axes);
                    if self.enabled {
                        let [x, y, z] = self.axes;
                        let mut sample = SensorEvent::acceleration(x, y, z);
                        sample.timestamp = event.time_ns;
                        out.push(sample);
                        received += 1;
                    } else {
                        trace!("[bma222] dropping sample while disabled");
                    }
                }
                other => {
                    error!("[bma222] unknown event (type={}, code={})", other, event.code);
                }
            }
            reader.next();
        }

        Ok(received)
    }

    fn has_pending_events(&self) -> bool {
        self.pending.is_some()
    }

    fn fd(&self) -> Option<RawFd> {
        self.input.as_ref().map(|reader| reader.fd())
    }
}

impl Drop for Bma222 {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = self.enable(ID_A, false) {
                warn!("[bma222] disable on shutdown failed: {}", e);
            }
        }
    }
}

pub static BMA222_FACTORY: Bma222Factory = Bma222Factory;

pub struct Bma222Factory;

impl SensorFactory for Bma222Factory {
    fn name(&self) -> &'static str {
        "bma222"
    }

    fn descriptors(&self) -> &'static [SensorDescriptor] {
        DESCRIPTORS
    }

    fn create(&self, config: &HalConfig) -> SensorResult<Box<dyn SensorDriver>> {
        Ok(Box::new(Bma222::open(config)))
    }
}
