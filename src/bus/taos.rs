//! TAOS ambient light / proximity control node (`/dev/tmd27711`).

use crate::errors::{SensorError, SensorResult};
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

const TAOS_IOCTL_MAGIC: u8 = 0xCF;

nix::ioctl_none!(taos_als_on, TAOS_IOCTL_MAGIC, 1);
nix::ioctl_none!(taos_als_off, TAOS_IOCTL_MAGIC, 2);
nix::ioctl_none!(taos_als_calibrate, TAOS_IOCTL_MAGIC, 4);
nix::ioctl_none!(taos_prox_on, TAOS_IOCTL_MAGIC, 7);
nix::ioctl_none!(taos_prox_off, TAOS_IOCTL_MAGIC, 8);
nix::ioctl_none!(taos_prox_calibrate, TAOS_IOCTL_MAGIC, 11);
nix::ioctl_none!(taos_sensor_on, TAOS_IOCTL_MAGIC, 12);
nix::ioctl_none!(taos_sensor_off, TAOS_IOCTL_MAGIC, 13);

/// Commands understood by the TAOS driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaosCommand {
    SensorOn,
    SensorOff,
    AlsOn,
    AlsOff,
    AlsCalibrate,
    ProxOn,
    ProxOff,
    ProxCalibrate,
}

impl TaosCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TaosCommand::SensorOn => "SENSOR_ON",
            TaosCommand::SensorOff => "SENSOR_OFF",
            TaosCommand::AlsOn => "ALS_ON",
            TaosCommand::AlsOff => "ALS_OFF",
            TaosCommand::AlsCalibrate => "ALS_CALIBRATE",
            TaosCommand::ProxOn => "PROX_ON",
            TaosCommand::ProxOff => "PROX_OFF",
            TaosCommand::ProxCalibrate => "PROX_CALIBRATE",
        }
    }
}

/// Control channel of a sensor chip
pub trait ControlDevice: Send {
    fn command(&mut self, cmd: TaosCommand) -> SensorResult<()>;
}

/// The real character device
pub struct TaosDevice {
    file: File,
    path: String,
}

impl TaosDevice {
    pub fn open(path: &Path) -> SensorResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SensorError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(Self {
            file,
            path: path.display().to_string(),
        })
    }
}

impl ControlDevice for TaosDevice {
    fn command(&mut self, cmd: TaosCommand) -> SensorResult<()> {
        let fd = self.file.as_raw_fd();
        // SAFETY: argument-less ioctls on a descriptor we own
        let result = unsafe {
            match cmd {
                TaosCommand::SensorOn => taos_sensor_on(fd),
                TaosCommand::SensorOff => taos_sensor_off(fd),
                TaosCommand::AlsOn => taos_als_on(fd),
                TaosCommand::AlsOff => taos_als_off(fd),
                TaosCommand::AlsCalibrate => taos_als_calibrate(fd),
                TaosCommand::ProxOn => taos_prox_on(fd),
                TaosCommand::ProxOff => taos_prox_off(fd),
                TaosCommand::ProxCalibrate => taos_prox_calibrate(fd),
            }
        };
        result.map(|_| ()).map_err(|source| SensorError::Ioctl {
            sensor: self.path.clone(),
            command: cmd.name(),
            source,
        })
    }
}
