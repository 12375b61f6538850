//! Fixed worker pool draining a FIFO of events.

use crate::server::event::Event;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Runs the protocol step for one event.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: Event);
}

struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

/// Unbounded FIFO guarded by a mutex, with a condvar signalled once per
/// submitted event.
struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: Event) -> usize {
        let depth = {
            let mut state = self.lock();
            state.events.push_back(event);
            state.events.len()
        };
        self.ready.notify_one();
        depth
    }

    /// Blocks until an event is available. `None` once the queue is closed.
    fn pop(&self) -> Option<Event> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    fn len(&self) -> usize {
        self.lock().events.len()
    }
}

pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers that hand every popped event to `handler`.
    pub fn start<H: EventHandler>(size: usize, handler: Arc<H>) -> io::Result<Self> {
        let queue = Arc::new(WorkQueue::new());
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(size),
        };

        for id in 0..size {
            let queue = pool.queue.clone();
            let handler = handler.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || {
                    while let Some(event) = queue.pop() {
                        trace!(worker = id, event = ?event, "event taken");
                        handler.handle(event);
                    }
                    debug!(worker = id, "worker exiting");
                });
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.stop();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Appends `event` to the queue and wakes one idle worker.
    pub fn submit(&self, event: Event) {
        let depth = self.queue.push(event);
        trace!(event = ?event, depth, "event queued");
    }

    /// Events queued but not yet taken by a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Closes the queue and joins the workers. Events still queued are dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
