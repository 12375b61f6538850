//! System V shared-memory segment reserved for a response cache.
//!
//! The segment starts with a process-shared semaphore; the remaining
//! `capacity` bytes are the cache area. Nothing reads or writes the area
//! yet, request handling serves straight from disk.

use crate::config::CacheConfig;
use anyhow::{Context, Result};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::ffi::OsStrExt;
use tracing::{debug, info, warn};

const HEADER: usize = std::mem::size_of::<libc::sem_t>();

pub struct SharedCache {
    shmid: libc::c_int,
    base: *mut u8,
    capacity: usize,
}

// The segment is only reached through `lock`, which serializes access.
unsafe impl Send for SharedCache {}
unsafe impl Sync for SharedCache {}

impl SharedCache {
    /// Creates (or reuses) the segment keyed by `cfg.key_path` and `cfg.project_id`.
    pub fn init(cfg: &CacheConfig) -> Result<Self> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.key_path)
            .with_context(|| format!("creating cache key file {}", cfg.key_path.display()))?;

        let path = CString::new(cfg.key_path.as_os_str().as_bytes())
            .context("cache key path contains a NUL byte")?;
        let key = unsafe { libc::ftok(path.as_ptr(), cfg.project_id) };
        if key == -1 {
            return Err(io::Error::last_os_error()).context("ftok");
        }

        let shmid = unsafe { libc::shmget(key, HEADER + cfg.capacity, 0o666 | libc::IPC_CREAT) };
        if shmid < 0 {
            return Err(io::Error::last_os_error()).context("shmget");
        }

        let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if addr as isize == -1 {
            let err = io::Error::last_os_error();
            unsafe { libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut()) };
            return Err(err).context("shmat");
        }

        let base = addr as *mut u8;
        if unsafe { libc::sem_init(base as *mut libc::sem_t, 1, 1) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::shmdt(addr);
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return Err(err).context("sem_init");
        }

        info!(shmid, capacity = cfg.capacity, "cache segment attached");
        Ok(Self {
            shmid,
            base,
            capacity: cfg.capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for exclusive access to the cache area.
    pub fn lock(&self) -> io::Result<CacheGuard<'_>> {
        loop {
            if unsafe { libc::sem_wait(self.sem()) } == 0 {
                return Ok(CacheGuard { cache: self });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn sem(&self) -> *mut libc::sem_t {
        self.base as *mut libc::sem_t
    }
}

impl Drop for SharedCache {
    fn drop(&mut self) {
        unsafe {
            libc::sem_destroy(self.sem());
            if libc::shmdt(self.base as *const libc::c_void) != 0 {
                warn!(error = %io::Error::last_os_error(), "shmdt failed");
            }
            libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
        }
        debug!(shmid = self.shmid, "cache segment removed");
    }
}

/// Exclusive view of the cache area; releases the semaphore on drop.
pub struct CacheGuard<'a> {
    cache: &'a SharedCache,
}

impl Deref for CacheGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.cache.base.add(HEADER), self.cache.capacity) }
    }
}

impl DerefMut for CacheGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.cache.base.add(HEADER), self.cache.capacity) }
    }
}

impl Drop for CacheGuard<'_> {
    fn drop(&mut self) {
        unsafe { libc::sem_post(self.cache.sem()) };
    }
}
