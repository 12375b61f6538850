//! Reactor and worker dispatch.
//!
//! One thread blocks in `epoll_wait` and turns readiness into [`Event`]s on
//! the work queue. Workers run the protocol step for each event and re-arm
//! the fd themselves, so the reactor never touches connection state.

pub mod event;
pub mod listener;
pub mod poller;
pub mod pool;
pub mod shutdown;
pub mod socket;
pub mod store;

pub use event::Event;
pub use shutdown::{ShutdownHandle, ShutdownToken};

use crate::config::{AcceptPolicy, Config};
use crate::http::connection::{self, Context as StepContext, Next};
use crate::listing::ServeRoot;
use anyhow::Context;
use poller::{Events, Poller};
use pool::{EventHandler, WorkerPool};
use shutdown::EventFd;
use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use store::ConnectionStore;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Worker-side handler: runs one step and applies its outcome to the fd.
struct Dispatcher {
    listener: TcpListener,
    poller: Poller,
    store: Arc<ConnectionStore>,
    root: ServeRoot,
    accept_policy: AcceptPolicy,
}

impl Dispatcher {
    fn apply(&self, fd: RawFd, next: Next) {
        match next {
            Next::Arm(interest) => {
                if let Err(e) = self.poller.arm(fd, interest) {
                    warn!(fd, error = %e, "re-arm failed, dropping connection");
                    self.store.forget(fd);
                    let _ = socket::close(fd);
                }
            }
            Next::Close(how) => {
                let _ = self.poller.disarm(fd);
                let _ = socket::shutdown(fd, how);
                let _ = socket::close(fd);
                debug!(fd, "connection closed");
            }
        }
    }
}

impl EventHandler for Dispatcher {
    fn handle(&self, event: Event) {
        let ctx = StepContext {
            store: &self.store,
            root: &self.root,
        };
        match event {
            Event::Accept => {
                listener::accept_ready(&self.listener, &self.poller, self.accept_policy);
            }
            Event::Readable(fd) => {
                let next = {
                    let _step = self.store.begin_step(fd);
                    connection::on_readable(fd, &ctx)
                };
                self.apply(fd, next);
            }
            Event::Writable(fd) => {
                let next = {
                    let _step = self.store.begin_step(fd);
                    connection::on_writable(fd, &ctx)
                };
                self.apply(fd, next);
            }
        }
    }
}

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    wake: Arc<EventFd>,
    shutdown: ShutdownHandle,
    shutdown_rx: Receiver<ShutdownToken>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listener, creates the multiplexer and starts the workers.
    pub fn bind(cfg: &Config) -> anyhow::Result<Self> {
        fs::create_dir_all(&cfg.serve_dir)
            .with_context(|| format!("creating serving directory {}", cfg.serve_dir.display()))?;

        let listener = listener::bind(&cfg.listen_addr)?;
        let local_addr = listener.local_addr().context("reading bound address")?;

        let poller = Poller::new().context("creating epoll instance")?;
        poller
            .register_listener(listener.as_raw_fd())
            .context("watching listener")?;

        let wake = Arc::new(EventFd::create().context("creating wake-up eventfd")?);
        poller
            .register_listener(wake.fd())
            .context("watching wake-up eventfd")?;

        let dispatcher = Arc::new(Dispatcher {
            listener,
            poller,
            store: Arc::new(ConnectionStore::new()),
            root: ServeRoot::new(cfg.serve_dir.clone(), cfg.template_path.clone()),
            accept_policy: cfg.accept_policy,
        });
        let pool = WorkerPool::start(cfg.workers, dispatcher.clone()).context("starting workers")?;
        let (shutdown, shutdown_rx) = ShutdownHandle::pair(wake.clone());

        info!(
            addr = %local_addr,
            workers = cfg.workers,
            dir = %cfg.serve_dir.display(),
            "server ready"
        );

        Ok(Self {
            dispatcher,
            pool,
            wake,
            shutdown,
            shutdown_rx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn store(&self) -> Arc<ConnectionStore> {
        self.dispatcher.store.clone()
    }

    /// Runs the reactor on the calling thread until a shutdown is requested.
    pub fn run(self) -> anyhow::Result<()> {
        let Server {
            dispatcher,
            pool,
            wake,
            shutdown_rx,
            ..
        } = self;
        let listener_fd = dispatcher.listener.as_raw_fd();
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        let result = loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("shutdown requested");
                break Ok(());
            }

            match dispatcher.poller.wait(&mut events) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e).context("waiting for readiness"),
            }

            for ready in events.iter() {
                let event = if ready.fd == wake.fd() {
                    wake.drain();
                    continue;
                } else if ready.fd == listener_fd {
                    Event::Accept
                } else if ready.readable {
                    Event::Readable(ready.fd)
                } else if ready.writable {
                    Event::Writable(ready.fd)
                } else {
                    continue;
                };
                pool.submit(event);
            }
        };

        let dropped = pool.pending();
        pool.shutdown();
        info!(dropped, "workers stopped");
        result
    }
}
