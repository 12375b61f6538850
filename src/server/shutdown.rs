//! Waking the reactor from another thread.
//!
//! The reactor blocks in `epoll_wait` with no timeout, so a shutdown request
//! is two things: a token on a channel, and a write to an eventfd that the
//! poller watches so the wait returns and the token is seen.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/// Non-blocking eventfd. Multiple notifications before a drain coalesce.
pub struct EventFd {
    fd: RawFd,
}

impl EventFd {
    pub fn create() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn notify(&self) -> io::Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // Counter saturated: a wake-up is already pending.
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Resets the counter so the next notify produces a fresh edge.
    pub fn drain(&self) {
        let mut val: u64 = 0;
        unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Sent once to ask the reactor to stop.
#[derive(Debug)]
pub struct ShutdownToken;

/// Cloneable handle that stops a running [`Server`](crate::server::Server).
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Sender<ShutdownToken>,
    wake: Arc<EventFd>,
}

impl ShutdownHandle {
    pub(crate) fn pair(wake: Arc<EventFd>) -> (Self, Receiver<ShutdownToken>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx, wake }, rx)
    }

    /// Requests shutdown. Calling it more than once, or after the server has
    /// already stopped, is harmless.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ShutdownToken);
        if let Err(e) = self.wake.notify() {
            tracing::warn!(error = %e, "could not wake the reactor");
        }
    }
}
