//! Kernel interfaces the drivers sit on: evdev streams, sysfs attributes
//! and the TAOS ioctl node.

pub mod input;
pub mod sysfs;
pub mod taos;
