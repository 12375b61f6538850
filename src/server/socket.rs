//! Thin wrappers over the socket syscalls used on connection fds.
//!
//! Connections are addressed only by their raw fd; every call here maps a
//! `-1` return to `io::Error::last_os_error()`.

use std::io;
use std::os::fd::RawFd;

fn cvt(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

pub fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    cvt(ret as isize)
}

pub fn send(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let ret = unsafe {
        libc::send(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    cvt(ret as isize)
}

/// Copies up to `count` bytes of `file_fd`, starting at `offset`, straight
/// into the socket.
pub fn sendfile(fd: RawFd, file_fd: RawFd, offset: u64, count: usize) -> io::Result<usize> {
    let mut off = offset as libc::off_t;
    let ret = unsafe { libc::sendfile(fd, file_fd, &mut off, count) };
    cvt(ret as isize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Write,
    Both,
}

pub fn shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Write => libc::SHUT_WR,
        Shutdown::Both => libc::SHUT_RDWR,
    };
    cvt(unsafe { libc::shutdown(fd, how) } as isize).map(|_| ())
}

pub fn close(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::close(fd) } as isize).map(|_| ())
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL, 0) } as isize)?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags as libc::c_int | libc::O_NONBLOCK) } as isize)
        .map(|_| ())
}
