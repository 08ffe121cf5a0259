//! # netmux-bootstrap - Supervisors for netmux I/O Handlers
//!
//! The entities that create and tear down [`netmux`] I/O handlers:
//!
//! - [`TcpAcceptor`]: binds and listens, spawns one [`netmux::TcpIo`] per
//!   accepted connection, tracks the active set.
//! - [`TcpConnector`]: dials a remote endpoint, optionally retrying with a
//!   fixed interval, and supervises the resulting single handler.
//! - [`UdpEntity`]: binds one UDP socket and supervises its singleton
//!   [`netmux::UdpIo`].
//! - [`SendToAll`]: a thread-safe bag of handles with broadcast send.
//!
//! ## Callback protocol
//!
//! `start(on_state_change, on_error)` registers two callbacks. For every
//! handler the supervisor creates it fires
//! `on_state_change(handle, count, true)` on the reactor; user code
//! typically calls `start_io` on the handle from inside that callback to
//! declare framing and install a message handler. When a handler
//! terminates (message handler returned `false`, transport error, peer
//! close, or cancellation), the supervisor fires `on_error(handle,
//! reason)` first and `on_state_change(handle, count, false)` second.
//!
//! ## Stopping
//!
//! `stop` is synchronous, idempotent, and cooperative: it signals the
//! accept/connect loop, requests `stop_io` on every live handler, and
//! returns. `graceful_stop().await` additionally waits until every
//! per-handler task, and therefore every error callback, has drained.
//! Supervisors are single-cycle: once stopped they do not restart.
//!
//! ```rust,no_run
//! use netmux_bootstrap::TcpAcceptor;
//! use netmux_codec::VariableFramer;
//! use netmux_executor::Worker;
//!
//! let mut worker = Worker::new("echo");
//! worker.start();
//! let ctx = worker.context().unwrap();
//!
//! let acceptor = TcpAcceptor::new(&ctx, "127.0.0.1:9000".parse().unwrap(), true).unwrap();
//! acceptor.start(
//!     |io, _count, starting| {
//!         if starting {
//!             io.start_io(Box::new(VariableFramer::big_endian(2)), |msg, io, _peer| {
//!                 if msg.len() <= 2 {
//!                     return false; // empty body ends the flow
//!                 }
//!                 io.send(msg);
//!                 true
//!             });
//!         }
//!     },
//!     |_io, err| log::info!("connection ended: {err}"),
//! );
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;
use wg::AsyncWaitGroup;

mod send_to_all;
mod tcp_acceptor;
mod tcp_connector;
mod udp_entity;

pub use send_to_all::SendToAll;
pub use tcp_acceptor::TcpAcceptor;
pub use tcp_connector::TcpConnector;
pub use udp_entity::UdpEntity;

/// Shared start/stop plumbing for the three supervisor types: the started
/// flag, the broadcast close channel the loops select on, and the wait
/// group that `graceful_stop` drains.
pub(crate) struct Supervisor {
    used: AtomicBool,
    started: AtomicBool,
    closing: AtomicBool,
    close_tx: Mutex<Option<broadcast::Sender<()>>>,
    wg: Mutex<Option<AsyncWaitGroup>>,
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        Self {
            used: AtomicBool::new(false),
            started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            close_tx: Mutex::new(None),
            wg: Mutex::new(None),
        }
    }

    /// Claim the single start cycle. Returns the close receiver and wait
    /// group for the supervisor's tasks, or `None` if already claimed.
    pub(crate) fn begin(&self) -> Option<(broadcast::Receiver<()>, AsyncWaitGroup)> {
        if self.used.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (close_tx, close_rx) = broadcast::channel::<()>(1);
        let wait_group = AsyncWaitGroup::new();
        *self.close_tx.lock().unwrap() = Some(close_tx);
        *self.wg.lock().unwrap() = Some(wait_group.clone());
        self.started.store(true, Ordering::SeqCst);
        Some((close_rx, wait_group))
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Signal the close channel. `true` only for the call that effected
    /// the transition out of the started state.
    pub(crate) fn signal_close(&self) -> bool {
        if !self.started.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.closing.store(true, Ordering::SeqCst);
        if let Some(close_tx) = self.close_tx.lock().unwrap().take() {
            let _ = close_tx.send(());
        }
        true
    }

    /// Mark a self-terminated supervisor (loop exit without `stop`).
    pub(crate) fn mark_stopped(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Wait until every task registered on the wait group has finished.
    pub(crate) async fn wait(&self) {
        let wait_group = self.wg.lock().unwrap().clone();
        if let Some(wait_group) = wait_group {
            wait_group.wait().await;
        }
    }
}
