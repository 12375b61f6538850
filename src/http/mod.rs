//! HTTP protocol implementation.
//!
//! Nothing in here owns a socket. Every step is handed a raw fd by a worker,
//! does as much as the kernel allows without blocking, and reports how the
//! fd should be armed next.
//!
//! # Architecture
//!
//! - **`connection`**: the readable and writable steps, glue between the two state machines
//! - **`parser`**: line splitting, request line and header parsing, boundary scanning
//! - **`multipart`**: the upload sub-machine that streams one file part to disk
//! - **`request`**: per-connection request state
//! - **`response`**: route classification, head encoding and response state
//! - **`writer`**: pushes the head and body out, resuming after partial writes
//!
//! # Request State Machine
//!
//! ```text
//!   Init ── request line ──▶ Head ── blank line ──▶ Body ──▶ Complete
//!     │                        │                      │
//!     └─────── malformed ──────┴──── peer closed ─────┴──▶ Error
//! ```
//!
//! A multipart POST walks `Begin → Head → Content → Complete` inside `Body`.
//!
//! # Response State Machine
//!
//! ```text
//!   Init ── setup ──▶ Head ── head sent ──▶ Body ── body sent ──▶ Complete
//!                       │                     │
//!                       └──── send failed ────┴──▶ Error
//! ```
//!
//! A send that would block leaves the state where it is; the next writable
//! step picks up at the recorded offset.

pub mod connection;
pub mod multipart;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
