//! fileserver - multi-threaded HTTP file server
//!
//! Core library: an edge-triggered epoll reactor feeding a fixed worker
//! pool, with per-connection request and response state machines.

pub mod cache;
pub mod config;
pub mod http;
pub mod listing;
pub mod server;
