//! # netmux - Message-Oriented Async TCP/UDP I/O Handlers
//!
//! `netmux` is the core of a reusable asynchronous networking library that
//! multiplexes message-oriented TCP and UDP I/O over a shared tokio
//! runtime. It provides the *handler runtime*: per-socket state machines
//! that frame incoming byte streams into discrete application messages,
//! queue outbound writes, and surface their lifecycle to user code through
//! a uniform weak handle type.
//!
//! ## Core Concepts
//!
//! ### I/O Handlers
//!
//! An I/O handler owns one socket and drives it to completion on a single
//! task:
//!
//! - **[`TcpIo`]**: one handler per connection. Reads are framed by a
//!   pluggable [`Framer`]; writes drain from a thread-safe
//!   [`OutputQueue`]; the peer endpoint is fixed for the handler's
//!   lifetime.
//! - **[`UdpIo`]**: one handler per endpoint. Every datagram is one
//!   message; an optional bound remote acts as both the default send
//!   destination and a receive filter.
//!
//! Handlers are created by a supervisor (an acceptor, connector, or UDP
//! entity; see the `netmux-bootstrap` crate), shared-owned via `Arc`, and
//! inert until `start_io` installs a message handler. The `started` flag
//! flips on exactly once and off exactly once; handlers are single-use.
//!
//! ### Handles
//!
//! User code never owns a handler. It receives an [`IoHandle`]: a weak,
//! thread-safe facade that upgrades its reference on every call and
//! degrades gracefully once the handler is gone:
//!
//! ```text
//!   supervisor ──strong──► Arc<TcpIo> ◄──strong── in-flight driver task
//!                              ▲
//!   user code ──weak─── IoHandle<TcpIo>   (total ops, never panics)
//! ```
//!
//! There is no cyclic ownership: supervisor → handler is strong, handle →
//! handler is weak, handler → supervisor is absent.
//!
//! ### Lifecycle and Callbacks
//!
//! A handler's driver delivers each framed message synchronously to the
//! installed [`MessageHandler`] on the reactor; returning `false` closes
//! the connection after pending writes drain. Supervisors report handler
//! creation/destruction through a [`StateChangeFn`] and termination
//! reasons through an [`ErrorFn`]. Within one handler all callbacks are
//! strictly serialized, so per-handler state needs no locking.
//!
//! ### Errors
//!
//! [`Error`] values are returned from calls or handed to the error
//! callback; they never unwind out of a reactor task. Invariant
//! violations (invalid handle, double start) fail synchronously;
//! transport, framing, and cancellation reasons arrive asynchronously
//! when the handler terminates.
//!
//! ## Example: echoing every frame
//!
//! ```ignore
//! // Inside a supervisor's state-change callback:
//! io.start_io(
//!     Box::new(VariableFramer::big_endian(2)),
//!     |msg, io, _peer| {
//!         if msg.len() <= 2 {
//!             return false; // empty body: end of flow
//!         }
//!         io.send(msg); // echo, header included
//!         true
//!     },
//! );
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

mod error;
mod framer;
mod handle;
mod queue;
mod tcp;
mod udp;

pub use error::{Error, Result};
pub use framer::{Framer, HeaderDecoder};
pub use handle::{ErrorFn, IoCore, IoHandle, MessageHandler, StateChangeFn, TcpIoHandle, UdpIoHandle};
pub use queue::{OutputQueue, OutputQueueStats};
pub use tcp::TcpIo;
pub use udp::{UdpIo, UdpStart, MAX_UDP_PAYLOAD};
