//! epoll wrapper.
//!
//! Connection fds are always registered edge-triggered and one-shot: after
//! one notification the fd stays silent until [`Poller::arm`] is called
//! again. That is what keeps a connection on at most one worker at a time.

use std::io;
use std::os::fd::RawFd;

/// What a connection should be woken for next. Read interest is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    ReadWrite,
}

impl Interest {
    fn bits(self) -> u32 {
        let base = (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLET | libc::EPOLLONESHOT) as u32;
        match self {
            Interest::Read => base,
            Interest::ReadWrite => base | libc::EPOLLOUT as u32,
        }
    }
}

/// One entry reported by [`Poller::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub fd: RawFd,
    /// Data, end of stream or an error is pending.
    pub readable: bool,
    pub writable: bool,
}

pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.buf[..self.len].iter().map(|ev| {
            let flags = ev.events;
            let data = ev.u64;
            let read_mask =
                (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;
            Readiness {
                fd: data as RawFd,
                readable: flags & read_mask != 0,
                writable: flags & libc::EPOLLOUT as u32 != 0,
            }
        })
    }
}

pub struct Poller {
    epfd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd })
    }

    /// Watches a listening or wake-up fd: edge-triggered, never one-shot.
    pub fn register_listener(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, (libc::EPOLLIN | libc::EPOLLET) as u32)
    }

    /// Adds a freshly accepted connection.
    pub fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest.bits())
    }

    /// Re-enables a connection that fired and went silent.
    pub fn arm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest.bits())
    }

    pub fn disarm(&self, fd: RawFd) -> io::Result<()> {
        let ret = unsafe {
            libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until at least one fd is ready. No timeout.
    pub fn wait(&self, events: &mut Events) -> io::Result<usize> {
        let ret = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.buf.as_mut_ptr(),
                events.buf.len() as libc::c_int,
                -1,
            )
        };
        if ret < 0 {
            events.len = 0;
            return Err(io::Error::last_os_error());
        }
        events.len = ret as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}
