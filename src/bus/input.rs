//! Kernel `input_event` records and the circular buffer that batches them.
//!
//! Records use the native `struct input_event` layout, so a whole batch is
//! pulled in with one `read(2)` and decoded in place.

use crate::errors::{SensorError, SensorResult};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::mem::size_of;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

pub const EV_SYN: u16 = 0x00;
pub const EV_ABS: u16 = 0x03;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_MISC: u16 = 0x28;

/// Size of one kernel record on this target
pub const INPUT_EVENT_SIZE: usize = size_of::<libc::input_event>();

/// One decoded kernel input record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Kernel timestamp converted from `timeval`
    pub time_ns: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { time_ns: 0, kind, code, value }
    }

    pub fn at(mut self, time_ns: i64) -> Self {
        self.time_ns = time_ns;
        self
    }

    /// Decodes one record from the front of `buf`
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < INPUT_EVENT_SIZE {
            return None;
        }
        // SAFETY: length checked above, read_unaligned tolerates any alignment
        let raw: libc::input_event =
            unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const libc::input_event) };
        Some(Self {
            time_ns: timeval_to_nano(&raw.time),
            kind: raw.type_,
            code: raw.code,
            value: raw.value,
        })
    }

    /// Encodes in the kernel layout; used to feed fake devices
    pub fn to_bytes(&self) -> Vec<u8> {
        let raw = libc::input_event {
            time: libc::timeval {
                tv_sec: (self.time_ns / 1_000_000_000) as libc::time_t,
                tv_usec: ((self.time_ns % 1_000_000_000) / 1_000) as libc::suseconds_t,
            },
            type_: self.kind,
            code: self.code,
            value: self.value,
        };
        // SAFETY: input_event is plain old data of exactly INPUT_EVENT_SIZE bytes
        let bytes = unsafe {
            std::slice::from_raw_parts(&raw as *const libc::input_event as *const u8, INPUT_EVENT_SIZE)
        };
        bytes.to_vec()
    }
}

pub fn timeval_to_nano(tv: &libc::timeval) -> i64 {
    tv.tv_sec as i64 * 1_000_000_000 + tv.tv_usec as i64 * 1_000
}

nix::ioctl_read!(eviocgabs_distance, b'E', 0x40 + ABS_DISTANCE, libc::input_absinfo);

/// Current value of `ABS_DISTANCE` as held by the evdev node
pub fn query_abs_distance(fd: RawFd) -> nix::Result<i32> {
    // SAFETY: input_absinfo is plain old data, fully written by the kernel on success
    let mut info: libc::input_absinfo = unsafe { std::mem::zeroed() };
    unsafe { eviocgabs_distance(fd, &mut info) }?;
    Ok(info.value)
}

/// Anything an input stream can be read from and polled on
pub trait EventSource: Read + AsRawFd + Send {
    /// Current `ABS_DISTANCE` value held by the device
    fn abs_distance(&self) -> nix::Result<i32> {
        query_abs_distance(self.as_raw_fd())
    }
}

impl EventSource for File {}
impl EventSource for UnixStream {}

/// Opens an evdev node read-only and non-blocking
pub fn open_event_device(path: &Path) -> SensorResult<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| SensorError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

/// Fixed-capacity ring of undelivered records
pub struct InputEventReader {
    source: Box<dyn EventSource>,
    name: String,
    capacity: usize,
    events: VecDeque<InputEvent>,
}

impl InputEventReader {
    pub fn new(source: Box<dyn EventSource>, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            source,
            name: name.into(),
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }

    pub fn abs_distance(&self) -> nix::Result<i32> {
        self.source.abs_distance()
    }

    /// Reads as many whole records as fit in the free space with a single
    /// `read(2)`. Returns the number of records added. A non-blocking source
    /// with nothing to offer yields 0; end of stream is `Disconnected`.
    pub fn fill(&mut self) -> SensorResult<usize> {
        let free = self.capacity - self.events.len();
        if free == 0 {
            return Ok(0);
        }

        let mut buf = vec![0u8; free * INPUT_EVENT_SIZE];
        let nread = match self.source.read(&mut buf) {
            Ok(0) => return Err(self.disconnected()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => return Err(self.disconnected()),
            Err(e) => {
                return Err(SensorError::Io {
                    path: self.name.clone(),
                    source: e,
                })
            }
        };
        if nread % INPUT_EVENT_SIZE != 0 {
            return Err(SensorError::PartialEvent { len: nread });
        }

        let added = nread / INPUT_EVENT_SIZE;
        for chunk in buf[..nread].chunks_exact(INPUT_EVENT_SIZE) {
            if let Some(event) = InputEvent::from_bytes(chunk) {
                self.events.push_back(event);
            }
        }
        Ok(added)
    }

    fn disconnected(&self) -> SensorError {
        SensorError::Disconnected {
            path: self.name.clone(),
        }
    }

    /// Oldest undelivered record, left in place until `next`
    pub fn peek(&self) -> Option<&InputEvent> {
        self.events.front()
    }

    pub fn next(&mut self) {
        self.events.pop_front();
    }
}
