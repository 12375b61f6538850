//! Per-connection protocol state shared by all workers.
//!
//! Two fd-keyed maps hold the request and response halves. A worker takes an
//! entry out for the length of its step and puts it back before the fd is
//! re-armed, so the maps are only locked for the swap itself.

use crate::http::request::{Phase, RequestState};
use crate::http::response::ResponseState;
use std::collections::{HashMap, HashSet};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct ConnectionStore {
    requests: Mutex<HashMap<RawFd, RequestState>>,
    responses: Mutex<HashMap<RawFd, ResponseState>>,
    in_step: Mutex<HashSet<RawFd>>,
    overlaps: AtomicUsize,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the request entry for `fd`, creating a fresh one if none exists.
    pub fn take_request(&self, fd: RawFd) -> RequestState {
        lock(&self.requests).remove(&fd).unwrap_or_default()
    }

    pub fn put_request(&self, fd: RawFd, req: RequestState) {
        lock(&self.requests).insert(fd, req);
    }

    /// Copy of the bytes the request side has buffered but not parsed.
    pub fn request_body(&self, fd: RawFd) -> Vec<u8> {
        lock(&self.requests)
            .get(&fd)
            .map(|req| req.pending.to_vec())
            .unwrap_or_default()
    }

    pub fn take_response(&self, fd: RawFd) -> Option<ResponseState> {
        lock(&self.responses).remove(&fd)
    }

    pub fn put_response(&self, fd: RawFd, resp: ResponseState) {
        lock(&self.responses).insert(fd, resp);
    }

    /// Points the response for `fd` at `target`. A response already being
    /// sent keeps its target.
    pub fn set_response_target(&self, fd: RawFd, target: &str) {
        let mut responses = lock(&self.responses);
        let resp = responses
            .entry(fd)
            .or_insert_with(|| ResponseState::new(target));
        if resp.phase() == Phase::Init {
            resp.target = target.to_string();
        }
    }

    pub fn has_response(&self, fd: RawFd) -> bool {
        lock(&self.responses).contains_key(&fd)
    }

    pub fn has_request(&self, fd: RawFd) -> bool {
        lock(&self.requests).contains_key(&fd)
    }

    /// Erases both halves; called before `fd` is closed.
    pub fn forget(&self, fd: RawFd) {
        lock(&self.requests).remove(&fd);
        lock(&self.responses).remove(&fd);
    }

    pub fn counts(&self) -> (usize, usize) {
        (lock(&self.requests).len(), lock(&self.responses).len())
    }

    /// Marks `fd` as being processed until the guard drops.
    ///
    /// One-shot arming means this never finds `fd` already marked; if it
    /// does, the overlap is logged and counted.
    pub fn begin_step(&self, fd: RawFd) -> StepGuard<'_> {
        if !lock(&self.in_step).insert(fd) {
            self.overlaps.fetch_add(1, Ordering::Relaxed);
            error!(fd, "connection delivered to two workers at once");
        }
        StepGuard { store: self, fd }
    }

    /// Number of times two steps ran for the same fd concurrently.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::Relaxed)
    }
}

pub struct StepGuard<'a> {
    store: &'a ConnectionStore,
    fd: RawFd,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        lock(&self.store.in_step).remove(&self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_entries_are_created_lazily() {
        let store = ConnectionStore::new();
        let req = store.take_request(5);
        assert_eq!(req.phase(), Phase::Init);
        assert!(!store.has_request(5));

        store.put_request(5, req);
        assert!(store.has_request(5));
        store.forget(5);
        assert_eq!(store.counts(), (0, 0));
    }

    #[test]
    fn in_flight_response_keeps_its_target() {
        let store = ConnectionStore::new();
        store.set_response_target(3, "/put/a");
        let mut resp = store.take_response(3).unwrap();
        resp.phase = Phase::Body;
        store.put_response(3, resp);

        store.set_response_target(3, "/put/b");
        assert_eq!(store.take_response(3).unwrap().target, "/put/a");
    }

    #[test]
    fn nested_step_on_same_fd_is_counted() {
        let store = ConnectionStore::new();
        {
            let _a = store.begin_step(4);
            let _b = store.begin_step(4);
        }
        assert_eq!(store.overlaps(), 1);
        let _c = store.begin_step(4);
        assert_eq!(store.overlaps(), 1);
    }
}
