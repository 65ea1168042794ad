//! sysfs helpers for input class devices.
//!
//! `/sys/class/input/inputN` carries a `name` attribute identifying the chip
//! and, for the drivers here, writable `enable` and `delay` attributes.

use crate::errors::{SensorError, SensorResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Finds the `inputN` directory under `class_dir` whose `name` matches.
///
/// Only the first line of `name` is compared. Unreadable entries are skipped.
pub fn find_class_path(class_dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("[sysfs] cannot scan {}: {}", class_dir.display(), e);
            return None;
        }
    };

    for entry in entries.flatten() {
        let dir_name = entry.file_name();
        if !dir_name.to_string_lossy().starts_with("input") {
            continue;
        }
        let candidate = entry.path();
        let Ok(contents) = fs::read_to_string(candidate.join("name")) else {
            continue;
        };
        if contents.lines().next().unwrap_or("") == name {
            debug!("[sysfs] '{}' found at {}", name, candidate.display());
            return Some(candidate);
        }
    }
    None
}

/// Name of the `eventN` child of an input class directory
pub fn find_event_node(class_path: &Path) -> Option<String> {
    let mut nodes: Vec<String> = fs::read_dir(class_path)
        .ok()?
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("event"))
        .collect();
    nodes.sort();
    nodes.into_iter().next()
}

/// Writes `value` into `<class_path>/<attr>`.
///
/// An empty value is `InvalidArgument`, matching the `-EINVAL` the
/// framework expects.
pub fn write_attr(class_path: &Path, attr: &str, value: &str) -> SensorResult<()> {
    if attr.is_empty() || value.is_empty() {
        return Err(SensorError::InvalidArgument(format!(
            "empty attribute write to {}",
            class_path.display()
        )));
    }

    let path = class_path.join(attr);
    let io_err = |e| SensorError::Io {
        path: path.display().to_string(),
        source: e,
    };
    let mut file = OpenOptions::new().read(true).write(true).open(&path).map_err(io_err)?;
    file.write_all(value.as_bytes()).map_err(io_err)?;
    Ok(())
}

/// Sysfs device bound to one chip name; the class path is resolved once.
#[derive(Debug, Clone)]
pub struct SysfsDevice {
    name: String,
    class_path: Option<PathBuf>,
}

impl SysfsDevice {
    pub fn discover(class_dir: &Path, name: &str) -> Self {
        let class_path = find_class_path(class_dir, name);
        if class_path.is_none() {
            warn!("[sysfs] failed to get class path for '{}'", name);
        }
        Self {
            name: name.to_string(),
            class_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_path(&self) -> Option<&Path> {
        self.class_path.as_deref()
    }

    pub fn write(&self, attr: &str, value: &str) -> SensorResult<()> {
        let class_path = self.class_path().ok_or_else(|| SensorError::NoClassPath {
            sensor: self.name.clone(),
        })?;
        write_attr(class_path, attr, value)
    }

    /// Device node of the matching evdev interface, if the kernel exposes one
    pub fn event_device(&self, dev_input_dir: &Path) -> Option<PathBuf> {
        let node = find_event_node(self.class_path()?)?;
        Some(dev_input_dir.join(node))
    }
}
