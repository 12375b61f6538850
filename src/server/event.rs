use std::os::fd::RawFd;

/// A unit of work handed from the reactor to a worker. Consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The listener has pending connections.
    Accept,
    Readable(RawFd),
    Writable(RawFd),
}
