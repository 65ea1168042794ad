//! TAOS TMD27711 ambient light and proximity sensor.
//!
//! Power and per-channel enables go through ioctls on the TAOS control
//! node, samples arrive on the chip's evdev node: `ABS_DISTANCE` for
//! proximity and `ABS_MISC` for the raw light level.

use super::{SensorDriver, SensorFactory};
use crate::bus::input::{
    open_event_device, InputEventReader, ABS_DISTANCE, ABS_MISC, EV_ABS, EV_SYN,
};
use crate::bus::sysfs::SysfsDevice;
use crate::bus::taos::{ControlDevice, TaosCommand, TaosDevice};
use crate::config::HalConfig;
use crate::errors::{SensorError, SensorResult};
use crate::messages::{monotonic_now_ns, SensorEvent, SensorType, ID_L, ID_P};
use crate::registry::SensorDescriptor;
use std::os::fd::RawFd;
use std::path::Path;
use tracing::{debug, error, info, warn};

const INPUT_BUFFER_EVENTS: usize = 32;

/// Distance reported when nothing is in front of the sensor (cm)
const PROXIMITY_FAR: f32 = 5.0;
const PROXIMITY_NEAR: f32 = 0.0;

pub const DESCRIPTORS: &[SensorDescriptor] = &[
    SensorDescriptor {
        name: c"TMD27711 proximity sensor",
        vendor: c"TAOS",
        version: 1,
        handle: ID_P,
        sensor_type: SensorType::Proximity,
        max_range: 5.0,
        resolution: 1.0,
        power: 0.5,
        min_delay: 0,
    },
    SensorDescriptor {
        name: c"TMD27711 light sensor",
        vendor: c"TAOS",
        version: 1,
        handle: ID_L,
        sensor_type: SensorType::Light,
        max_range: 10000.0,
        resolution: 1.0,
        power: 0.5,
        min_delay: 0,
    },
];

fn distance_from_raw(value: i32) -> f32 {
    if value > 0 {
        PROXIMITY_FAR
    } else {
        PROXIMITY_NEAR
    }
}

/// Event held back for the next `read_events`
enum Pending {
    /// Overflow of a kernel batch, already carrying the kernel timestamp
    Sample(SensorEvent),
    /// Proximity state queried on enable, stamped when delivered
    InitialState(SensorEvent),
}

pub struct Tmd27711 {
    control: Box<dyn ControlDevice>,
    input: Option<InputEventReader>,
    als_enabled: bool,
    prox_enabled: bool,
    /// Channel values seen since the last `EV_SYN`
    batch_distance: Option<f32>,
    batch_light: Option<f32>,
    pending: Option<Pending>,
}

impl Tmd27711 {
    /// Takes ownership of both devices. When an input device is present the
    /// chip is powered on and both channels calibrated.
    pub fn new(control: Box<dyn ControlDevice>, input: Option<InputEventReader>) -> Self {
        let mut sensor = Self {
            control,
            input,
            als_enabled: false,
            prox_enabled: false,
            batch_distance: None,
            batch_light: None,
            pending: None,
        };
        if sensor.input.is_some() {
            for cmd in [TaosCommand::SensorOn, TaosCommand::ProxCalibrate, TaosCommand::AlsCalibrate] {
                if let Err(e) = sensor.control.command(cmd) {
                    warn!("[tmd27711] {}", e);
                }
            }
        }
        sensor
    }

    pub fn open(config: &HalConfig) -> SensorResult<Self> {
        let control_path = Path::new(&config.proximity_light.control_device);
        let control = TaosDevice::open(control_path)?;
        info!("[tmd27711] control device {}", control_path.display());

        let sysfs = SysfsDevice::discover(&config.paths.input_class_dir, &config.proximity_light.name);
        let input = sysfs
            .event_device(&config.paths.dev_input_dir)
            .and_then(|node| match open_event_device(&node) {
                Ok(file) => Some(InputEventReader::new(
                    Box::new(file),
                    node.display().to_string(),
                    INPUT_BUFFER_EVENTS,
                )),
                Err(e) => {
                    error!("[tmd27711] {}", e);
                    None
                }
            });
        if input.is_none() {
            warn!("[tmd27711] no input device for '{}'", sysfs.name());
        }

        Ok(Self::new(Box::new(control), input))
    }

    /// Queues the current proximity state so the framework gets a reading
    /// right after enabling, before the chip reports a change. An event
    /// already held back takes precedence.
    fn set_initial_state(&mut self) {
        let Some(reader) = self.input.as_ref() else {
            return;
        };
        if self.pending.is_some() {
            debug!("[tmd27711] event pending, skipping initial proximity state");
            return;
        }
        match reader.abs_distance() {
            Ok(value) => {
                let event = SensorEvent::proximity(distance_from_raw(value));
                self.pending = Some(Pending::InitialState(event));
            }
            Err(e) => debug!("[tmd27711] no initial proximity state: {}", e),
        }
    }

    fn channel_enabled(&self, event: &SensorEvent) -> bool {
        match event.sensor_type {
            SensorType::Proximity => self.prox_enabled,
            SensorType::Light => self.als_enabled,
            SensorType::Accelerometer => false,
        }
    }

    /// Turns the batch closed by an `EV_SYN` into events of enabled channels
    fn close_batch(&mut self, time_ns: i64) -> Vec<SensorEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(distance) = self.batch_distance.take() {
            if self.prox_enabled {
                events.push(SensorEvent::proximity(distance));
            }
        }
        if let Some(lux) = self.batch_light.take() {
            if self.als_enabled {
                events.push(SensorEvent::light(lux));
            }
        }
        for event in events.iter_mut() {
            event.timestamp = time_ns;
        }
        events
    }
}

impl SensorDriver for Tmd27711 {
    fn name(&self) -> &str {
        "tmd27711"
    }

    fn handles(&self) -> &'static [i32] {
        &[ID_P, ID_L]
    }

    fn enable(&mut self, handle: i32, enabled: bool) -> SensorResult<()> {
        match handle {
            ID_L => {
                if enabled != self.als_enabled {
                    let cmd = if enabled { TaosCommand::AlsOn } else { TaosCommand::AlsOff };
                    self.control.command(cmd)?;
                    self.als_enabled = enabled;
                    debug!("[tmd27711] light enabled={}", enabled);
                }
            }
            ID_P => {
                if enabled != self.prox_enabled {
                    let cmd = if enabled { TaosCommand::ProxOn } else { TaosCommand::ProxOff };
                    self.control.command(cmd)?;
                    self.prox_enabled = enabled;
                    debug!("[tmd27711] proximity enabled={}", enabled);
                    if enabled {
                        self.set_initial_state();
                    }
                }
            }
            _ => return Err(SensorError::UnknownHandle { handle }),
        }
        Ok(())
    }

    fn is_enabled(&self, handle: i32) -> bool {
        match handle {
            ID_L => self.als_enabled,
            ID_P => self.prox_enabled,
            _ => false,
        }
    }

    fn set_delay(&mut self, handle: i32, _delay_ns: i64) -> SensorResult<()> {
        if !self.handles().contains(&handle) {
            return Err(SensorError::UnknownHandle { handle });
        }
        Ok(())
    }

    fn read_events(&mut self, out: &mut Vec<SensorEvent>, count: usize) -> SensorResult<usize> {
        if count < 1 {
            return Err(SensorError::InvalidArgument("event count must be at least 1".to_string()));
        }

        if let Some(pending) = self.pending.take() {
            let event = match pending {
                Pending::Sample(event) => event,
                Pending::InitialState(mut event) => {
                    event.timestamp = monotonic_now_ns();
                    event
                }
            };
            if !self.channel_enabled(&event) {
                return Ok(0);
            }
            out.push(event);
            return Ok(1);
        }

        let reader = self.input.as_mut().ok_or_else(|| SensorError::NoDevice {
            sensor: "tmd27711".to_string(),
        })?;
        reader.fill()?;

        let mut received = 0;
        while received < count {
            let Some(event) = self.input.as_ref().and_then(|r| r.peek().copied()) else {
                break;
            };
            match event.kind {
                EV_ABS => match event.code {
                    ABS_DISTANCE => self.batch_distance = Some(distance_from_raw(event.value)),
                    ABS_MISC => self.batch_light = Some(event.value as f32),
                    _ => {}
                },
                EV_SYN => {
                    for sample in self.close_batch(event.time_ns) {
                        if received < count {
                            out.push(sample);
                            received += 1;
                        } else {
                            self.pending = Some(Pending::Sample(sample));
                        }
                    }
                }
                other => {
                    error!("[tmd27711] unknown event (type={}, code={})", other, event.code);
                }
            }
            if let Some(reader) = self.input.as_mut() {
                reader.next();
            }
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

impl Drop for Tmd27711 {
    fn drop(&mut self) {
        if let Err(e) = self.control.command(TaosCommand::SensorOff) {
            warn!("[tmd27711] power off failed: {}", e);
        }
    }
}

pub static TMD27711_FACTORY: Tmd27711Factory = Tmd27711Factory;

pub struct Tmd27711Factory;

impl SensorFactory for Tmd27711Factory {
    fn name(&self) -> &'static str {
        "tmd27711"
    }

    fn descriptors(&self) -> &'static [SensorDescriptor] {
        DESCRIPTORS
    }

    fn create(&self, config: &HalConfig) -> SensorResult<Box<dyn SensorDriver>> {
        Ok(Box::new(Tmd27711::open(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::input::InputEvent;
    use crate::messages::EventPayload;
    use crate::testutil::{event_stream, proximity_stream, RecordingControl};
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn sensor_with_stream() -> (Tmd27711, RecordingControl, UnixStream) {
        let control = RecordingControl::default();
        let (reader, tx) = event_stream(INPUT_BUFFER_EVENTS);
        let sensor = Tmd27711::new(Box::new(control.clone()), Some(reader));
        control.clear();
        (sensor, control, tx)
    }

    fn send(tx: &mut UnixStream, events: &[InputEvent]) {
        for event in events {
            tx.write_all(&event.to_bytes()).unwrap();
        }
    }

    #[test]
    fn test_power_on_sequence() {
        let control = RecordingControl::default();
        let (reader, _tx) = event_stream(INPUT_BUFFER_EVENTS);
        let sensor = Tmd27711::new(Box::new(control.clone()), Some(reader));
        assert_eq!(
            control.commands(),
            vec![TaosCommand::SensorOn, TaosCommand::ProxCalibrate, TaosCommand::AlsCalibrate]
        );

        drop(sensor);
        assert_eq!(control.commands().last(), Some(&TaosCommand::SensorOff));
    }

    #[test]
    fn test_no_power_on_without_input() {
        let control = RecordingControl::default();
        let _sensor = Tmd27711::new(Box::new(control.clone()), None);
        assert!(control.commands().is_empty());
    }

    #[test]
    fn test_one_ioctl_per_transition() {
        let (mut sensor, control, _tx) = sensor_with_stream();

        sensor.enable(ID_L, true).unwrap();
        sensor.enable(ID_L, true).unwrap();
        sensor.enable(ID_P, true).unwrap();
        sensor.enable(ID_P, true).unwrap();
        sensor.enable(ID_L, false).unwrap();
        sensor.enable(ID_L, false).unwrap();
        sensor.enable(ID_P, false).unwrap();

        assert_eq!(
            control.commands(),
            vec![
                TaosCommand::AlsOn,
                TaosCommand::ProxOn,
                TaosCommand::AlsOff,
                TaosCommand::ProxOff,
            ]
        );
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut sensor, _control, _tx) = sensor_with_stream();

        sensor.enable(ID_P, true).unwrap();
        assert!(sensor.is_enabled(ID_P));
        assert!(!sensor.is_enabled(ID_L));

        sensor.enable(ID_L, true).unwrap();
        sensor.enable(ID_P, false).unwrap();
        assert!(!sensor.is_enabled(ID_P));
        assert!(sensor.is_enabled(ID_L));
    }

    #[test]
    fn test_unknown_handle() {
        let (mut sensor, control, _tx) = sensor_with_stream();
        assert!(matches!(sensor.enable(0, true), Err(SensorError::UnknownHandle { handle: 0 })));
        assert!(sensor.set_delay(0, 1).is_err());
        assert!(sensor.set_delay(ID_L, 200_000_000).is_ok());
        assert!(control.commands().is_empty());
    }

    #[test]
    fn test_failed_ioctl_keeps_state() {
        let (mut sensor, control, _tx) = sensor_with_stream();
        control.fail_next();
        assert!(sensor.enable(ID_L, true).is_err());
        assert!(!sensor.is_enabled(ID_L));

        sensor.enable(ID_L, true).unwrap();
        assert!(sensor.is_enabled(ID_L));
    }

    #[test]
    fn test_demultiplexes_channels() {
        let (mut sensor, _control, mut tx) = sensor_with_stream();
        sensor.enable(ID_P, true).unwrap();
        sensor.enable(ID_L, true).unwrap();

        send(
            &mut tx,
            &[
                InputEvent::new(EV_ABS, ABS_DISTANCE, 1),
                InputEvent::new(EV_ABS, ABS_MISC, 250),
                InputEvent::new(EV_SYN, 0, 0).at(9_000),
                InputEvent::new(EV_ABS, ABS_DISTANCE, 0),
                InputEvent::new(EV_SYN, 0, 0).at(10_000),
            ],
        );

        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 8).unwrap(), 3);
        assert_eq!(out[0].sensor, ID_P);
        assert_eq!(out[0].payload, EventPayload::Distance(5.0));
        assert_eq!(out[0].timestamp, 9_000);
        assert_eq!(out[1].sensor, ID_L);
        assert_eq!(out[1].sensor_type, SensorType::Light);
        assert_eq!(out[1].payload, EventPayload::Light(250.0));
        assert_eq!(out[2].payload, EventPayload::Distance(0.0));
        assert_eq!(out[2].timestamp, 10_000);
    }

    #[test]
    fn test_disabled_channel_is_suppressed() {
        let (mut sensor, _control, mut tx) = sensor_with_stream();
        sensor.enable(ID_L, true).unwrap();

        send(
            &mut tx,
            &[
                InputEvent::new(EV_ABS, ABS_DISTANCE, 1),
                InputEvent::new(EV_ABS, ABS_MISC, 40),
                InputEvent::new(EV_SYN, 0, 0),
            ],
        );

        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 8).unwrap(), 1);
        assert_eq!(out[0].sensor, ID_L);
        assert!(!sensor.is_enabled(ID_P));
    }

    #[test]
    fn test_overflow_goes_to_pending() {
        let (mut sensor, _control, mut tx) = sensor_with_stream();
        sensor.enable(ID_P, true).unwrap();
        sensor.enable(ID_L, true).unwrap();

        send(
            &mut tx,
            &[
                InputEvent::new(EV_ABS, ABS_DISTANCE, 0),
                InputEvent::new(EV_ABS, ABS_MISC, 7),
                InputEvent::new(EV_SYN, 0, 0).at(5_000),
            ],
        );

        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert!(sensor.has_pending_events());
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert!(!sensor.has_pending_events());
        assert_eq!(out[1].payload, EventPayload::Light(7.0));
        assert_eq!(out[1].timestamp, 5_000);
    }

    #[test]
    fn test_overflow_keeps_zero_kernel_timestamp() {
        let (mut sensor, _control, mut tx) = sensor_with_stream();
        sensor.enable(ID_P, true).unwrap();
        sensor.enable(ID_L, true).unwrap();

        send(
            &mut tx,
            &[
                InputEvent::new(EV_ABS, ABS_DISTANCE, 1),
                InputEvent::new(EV_ABS, ABS_MISC, 12),
                InputEvent::new(EV_SYN, 0, 0),
            ],
        );

        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert_eq!(out[1].payload, EventPayload::Light(12.0));
        assert_eq!(out[1].timestamp, 0);
    }

    fn sensor_with_distance(distance: i32) -> (Tmd27711, UnixStream) {
        let (reader, tx) = proximity_stream(INPUT_BUFFER_EVENTS, distance);
        let sensor = Tmd27711::new(Box::new(RecordingControl::default()), Some(reader));
        (sensor, tx)
    }

    #[test]
    fn test_initial_state_queued_on_enable() {
        let (mut sensor, _tx) = sensor_with_distance(0);
        sensor.enable(ID_P, true).unwrap();
        assert!(sensor.has_pending_events());

        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 4).unwrap(), 1);
        assert_eq!(out[0].sensor, ID_P);
        assert_eq!(out[0].payload, EventPayload::Distance(PROXIMITY_NEAR));
        assert!(out[0].timestamp > 0);
        assert!(!sensor.has_pending_events());

        let (mut sensor, _tx) = sensor_with_distance(3);
        sensor.enable(ID_P, true).unwrap();
        sensor.read_events(&mut out, 4).unwrap();
        assert_eq!(out[1].payload, EventPayload::Distance(PROXIMITY_FAR));
    }

    #[test]
    fn test_initial_state_keeps_buffered_event() {
        let (mut sensor, mut tx) = sensor_with_distance(1);
        sensor.enable(ID_L, true).unwrap();
        sensor.enable(ID_P, true).unwrap();

        let mut out = Vec::new();
        sensor.read_events(&mut out, 1).unwrap();
        out.clear();

        send(
            &mut tx,
            &[
                InputEvent::new(EV_ABS, ABS_DISTANCE, 0),
                InputEvent::new(EV_ABS, ABS_MISC, 33),
                InputEvent::new(EV_SYN, 0, 0).at(8_000),
            ],
        );
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert!(sensor.has_pending_events());

        // Re-enabling proximity must not replace the held-back light sample
        sensor.enable(ID_P, false).unwrap();
        sensor.enable(ID_P, true).unwrap();
        assert_eq!(sensor.read_events(&mut out, 1).unwrap(), 1);
        assert_eq!(out[1].payload, EventPayload::Light(33.0));
        assert_eq!(out[1].timestamp, 8_000);
    }

    #[test]
    fn test_initial_state_query_failure_is_ignored() {
        // A socket does not answer EVIOCGABS, so no initial event is queued
        let (mut sensor, _control, _tx) = sensor_with_stream();
        sensor.enable(ID_P, true).unwrap();
        assert!(!sensor.has_pending_events());
    }

    #[test]
    fn test_read_without_input() {
        let mut sensor = Tmd27711::new(Box::new(RecordingControl::default()), None);
        let mut out = Vec::new();
        assert_eq!(sensor.read_events(&mut out, 1).unwrap_err().errno(), -libc::ENODEV);
        assert!(sensor.read_events(&mut out, 0).is_err());
    }
}
