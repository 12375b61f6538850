use crate::config::AcceptPolicy;
use crate::server::poller::{Interest, Poller};
use crate::server::socket;
use anyhow::Context;
use std::io;
use std::net::TcpListener;
use std::os::fd::IntoRawFd;
use tracing::{info, warn};

/// Binds the listening socket in non-blocking mode.
pub fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {}", addr))?;
    listener
        .set_nonblocking(true)
        .context("setting listener non-blocking")?;
    Ok(listener)
}

/// Accepts pending connections and registers each for one-shot read interest.
///
/// With [`AcceptPolicy::Single`] only one connection is taken per
/// notification, so with an edge-triggered listener a burst can leave
/// connections waiting until the next arrival. [`AcceptPolicy::Drain`] keeps
/// accepting until the backlog is empty. Returns the number accepted.
pub fn accept_ready(listener: &TcpListener, poller: &Poller, policy: AcceptPolicy) -> usize {
    let mut accepted = 0;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let fd = stream.into_raw_fd();
                let watched = socket::set_nonblocking(fd)
                    .and_then(|_| poller.register(fd, Interest::Read));
                if let Err(e) = watched {
                    warn!(fd, error = %e, "could not watch accepted connection");
                    let _ = socket::close(fd);
                } else {
                    info!(fd, peer = %peer, "accepted connection");
                    accepted += 1;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "accept failed");
                break;
            }
        }
        if policy == AcceptPolicy::Single {
            break;
        }
    }
    accepted
}
