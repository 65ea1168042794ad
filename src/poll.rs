//! The `sensors_poll_device_t` behind the HAL: routes handles to drivers and
//! multiplexes their input descriptors with `poll(2)`.
//!
//! The framework calls `activate` and `setDelay` from its own threads while
//! `poll` blocks, so every entry point takes `&self`. Driver state sits
//! behind one lock that is released for the duration of the `poll(2)` wait.

use crate::errors::{SensorError, SensorResult};
use crate::messages::SensorEvent;
use crate::sensors::SensorDriver;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

const WAKE_MESSAGE: u8 = b'W';

/// Interrupts a blocked `poll_events` from another thread
#[derive(Clone)]
pub struct Waker {
    pipe: Arc<File>,
}

impl Waker {
    pub fn wake(&self) -> SensorResult<()> {
        match (&*self.pipe).write(&[WAKE_MESSAGE]) {
            Ok(_) => Ok(()),
            // A full pipe already guarantees a wake-up
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(SensorError::Io {
                path: "wake pipe".to_string(),
                source: e,
            }),
        }
    }
}

struct DriverSlot {
    driver: Box<dyn SensorDriver>,
    /// Input reported readable and not drained since
    ready: bool,
    /// Input hung up; its descriptor is no longer polled
    detached: bool,
}

pub struct PollContext {
    slots: Mutex<Vec<DriverSlot>>,
    wake_read: File,
    waker: Waker,
}

impl PollContext {
    pub fn new(drivers: Vec<Box<dyn SensorDriver>>) -> SensorResult<Self> {
        let (read_end, write_end) =
            nix::unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).map_err(SensorError::Poll)?;
        let slots = drivers
            .into_iter()
            .map(|driver| DriverSlot {
                driver,
                ready: false,
                detached: false,
            })
            .collect();
        Ok(Self {
            slots: Mutex::new(slots),
            wake_read: File::from(read_end),
            waker: Waker {
                pipe: Arc::new(File::from(write_end)),
            },
        })
    }

    pub fn waker(&self) -> Waker {
        self.waker.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DriverSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_driver<T>(
        &self,
        handle: i32,
        f: impl FnOnce(&mut dyn SensorDriver) -> SensorResult<T>,
    ) -> SensorResult<T> {
        let mut slots = self.lock();
        let slot = slots
            .iter_mut()
            .find(|slot| slot.driver.handles().contains(&handle))
            .ok_or(SensorError::UnknownHandle { handle })?;
        f(slot.driver.as_mut())
    }

    pub fn activate(&self, handle: i32, enabled: bool) -> SensorResult<()> {
        self.with_driver(handle, |driver| driver.enable(handle, enabled))?;
        debug!("[poll] handle {} enabled={}", handle, enabled);
        if enabled {
            // Let a blocked poll pick up the newly active descriptor
            self.waker.wake()?;
        }
        Ok(())
    }

    pub fn is_enabled(&self, handle: i32) -> bool {
        self.with_driver(handle, |driver| Ok(driver.is_enabled(handle)))
            .unwrap_or(false)
    }

    pub fn set_delay(&self, handle: i32, delay_ns: i64) -> SensorResult<()> {
        self.with_driver(handle, |driver| driver.set_delay(handle, delay_ns))
    }

    /// Collects up to `count` events, blocking until at least one is
    /// available or the context is woken. A wake-up with nothing to report
    /// returns 0.
    pub fn poll_events(&self, out: &mut Vec<SensorEvent>, count: usize) -> SensorResult<usize> {
        if count < 1 {
            return Err(SensorError::InvalidArgument("event count must be at least 1".to_string()));
        }

        let mut collected = 0;
        loop {
            collected += self.collect(out, count - collected)?;
            if collected >= count {
                break;
            }

            let timeout = if collected > 0 {
                PollTimeout::ZERO
            } else {
                PollTimeout::NONE
            };
            let (n, woken) = self.wait(timeout)?;
            trace!("[poll] {} descriptor(s) ready", n);
            if woken && collected == 0 && !self.has_work() {
                return Ok(0);
            }
            if n == 0 {
                break;
            }
        }
        Ok(collected)
    }

    /// One pass over the drivers with readable input or a held-back event
    fn collect(&self, out: &mut Vec<SensorEvent>, count: usize) -> SensorResult<usize> {
        let mut collected = 0;
        for slot in self.lock().iter_mut() {
            if collected >= count {
                break;
            }
            if !slot.ready && !slot.driver.has_pending_events() {
                continue;
            }
            let wanted = count - collected;
            match slot.driver.read_events(out, wanted) {
                Ok(n) => {
                    if n < wanted {
                        // Drained; wait for the next readiness report
                        slot.ready = false;
                    }
                    collected += n;
                }
                Err(SensorError::Disconnected { path }) => {
                    warn!("[poll] {} hung up, no longer polling it", path);
                    slot.ready = false;
                    slot.detached = true;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(collected)
    }

    fn has_work(&self) -> bool {
        self.lock()
            .iter()
            .any(|slot| slot.ready || slot.driver.has_pending_events())
    }

    /// One `poll(2)` over every live driver descriptor plus the wake pipe.
    /// Updates readiness and reports whether the wake pipe fired.
    fn wait(&self, timeout: PollTimeout) -> SensorResult<(i32, bool)> {
        let polled: Vec<(usize, RawFd)> = self
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.detached)
            .filter_map(|(index, slot)| slot.driver.fd().map(|fd| (index, fd)))
            .collect();

        let mut fds: Vec<PollFd<'_>> = polled
            .iter()
            // SAFETY: drivers are only dropped with the context, which outlives this call
            .map(|(_, fd)| PollFd::new(unsafe { BorrowedFd::borrow_raw(*fd) }, PollFlags::POLLIN))
            .collect();
        fds.push(PollFd::new(self.wake_read.as_fd(), PollFlags::POLLIN));

        let n = loop {
            match poll(&mut fds, timeout) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SensorError::Poll(e)),
            }
        };

        let revents: Vec<PollFlags> = fds
            .iter()
            .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
            .collect();
        drop(fds);

        let hangup = PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        {
            let mut slots = self.lock();
            for ((index, _), events) in polled.iter().zip(revents.iter()) {
                let slot = &mut slots[*index];
                if events.contains(PollFlags::POLLIN) {
                    // Any hangup surfaces from the read once the data is gone
                    slot.ready = true;
                } else if events.intersects(hangup) {
                    warn!("[poll] {} input hung up ({:?}), no longer polling it", slot.driver.name(), events);
                    slot.detached = true;
                }
            }
        }

        let woken = revents
            .last()
            .map(|r| r.contains(PollFlags::POLLIN))
            .unwrap_or(false);
        if woken {
            self.drain_wake_pipe();
        }
        Ok((n, woken))
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.wake_read).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("[poll] error reading from wake pipe: {}", e);
                    break;
                }
            }
        }
    }
}
