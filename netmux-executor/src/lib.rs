//! # netmux-executor - Event-Loop Worker for netmux
//!
//! `netmux-executor` owns the reactor threads the rest of the workspace
//! runs on. A [`Worker`] starts a named (optionally CPU-pinned) tokio
//! runtime and keeps it alive (the runtime is the work guard) until
//! `stop` releases it. Supervisors are bound to a worker through its
//! [`IoContext`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netmux_executor::Worker;
//!
//! let mut worker = Worker::new("app-net");
//! worker.start();
//! let ctx = worker.context().expect("worker started");
//! // hand `ctx` to acceptors / connectors / UDP entities ...
//! worker.stop();
//! ```
//!
//! ## CPU Pinning
//!
//! ```rust,no_run
//! use core_affinity::CoreId;
//! use netmux_executor::Worker;
//!
//! let mut worker = Worker::new("pinned-net")
//!     .worker_threads(2)
//!     .pin_to(vec![CoreId { id: 0 }, CoreId { id: 1 }]);
//! worker.start();
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

mod worker;

/// The execution context supervisors are bound to: a handle onto a
/// running [`Worker`]'s reactor.
pub type IoContext = tokio::runtime::Handle;

pub use worker::Worker;
