//! Fixtures shared by the unit tests: scratch sysfs trees, socket-backed
//! event streams and a control device that records commands.

use crate::bus::input::{EventSource, InputEventReader};
use crate::bus::taos::{ControlDevice, TaosCommand};
use crate::errors::{SensorError, SensorResult};
use std::fs;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Directory removed again on drop
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(tag: &str) -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "cooper-sensors-{}-{}-{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates `<dir>/<entry>/name` the way `/sys/class/input` lays it out
    pub fn input_device(&self, entry: &str, name: &str) -> PathBuf {
        let class = self.path.join(entry);
        fs::create_dir_all(&class).unwrap();
        fs::write(class.join("name"), name).unwrap();
        class
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// A non-blocking reader fed through the returned socket
pub fn event_stream(capacity: usize) -> (InputEventReader, UnixStream) {
    let (rx, tx) = UnixStream::pair().unwrap();
    rx.set_nonblocking(true).unwrap();
    (InputEventReader::new(Box::new(rx), "test-stream", capacity), tx)
}

/// Socket-fed source whose `ABS_DISTANCE` query answers a fixed value
struct ProximitySource {
    stream: UnixStream,
    distance: i32,
}

impl Read for ProximitySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl AsRawFd for ProximitySource {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl EventSource for ProximitySource {
    fn abs_distance(&self) -> nix::Result<i32> {
        Ok(self.distance)
    }
}

/// Like `event_stream`, for a proximity chip currently reading `distance`
pub fn proximity_stream(capacity: usize, distance: i32) -> (InputEventReader, UnixStream) {
    let (rx, tx) = UnixStream::pair().unwrap();
    rx.set_nonblocking(true).unwrap();
    let source = ProximitySource { stream: rx, distance };
    (InputEventReader::new(Box::new(source), "test-proximity", capacity), tx)
}

#[derive(Default)]
struct Recording {
    commands: Vec<TaosCommand>,
    fail_next: bool,
}

/// Control device that logs every successful command
#[derive(Clone, Default)]
pub struct RecordingControl {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingControl {
    pub fn commands(&self) -> Vec<TaosCommand> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().commands.clear();
    }

    /// The next command fails with `ENOTTY` and is not recorded
    pub fn fail_next(&self) {
        self.inner.lock().unwrap().fail_next = true;
    }
}

impl ControlDevice for RecordingControl {
    fn command(&mut self, cmd: TaosCommand) -> SensorResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next {
            inner.fail_next = false;
            return Err(SensorError::Ioctl {
                sensor: "recording".to_string(),
                command: cmd.name(),
                source: nix::Error::ENOTTY,
            });
        }
        inner.commands.push(cmd);
        Ok(())
    }
}
