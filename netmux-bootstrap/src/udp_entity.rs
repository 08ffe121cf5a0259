use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::trace;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use netmux::{Error, IoCore, IoHandle, UdpIo, UdpIoHandle};
use netmux_executor::IoContext;

use crate::Supervisor;

/// Supervises a single [`UdpIo`] endpoint handler.
///
/// Binding happens at `start`: to `local` when given, otherwise to a
/// wildcard ephemeral address (the client case). The single handler goes
/// through the same callback protocol as TCP supervisors, with handler
/// counts 1 and 0.
pub struct UdpEntity {
    ctx: IoContext,
    local: Option<SocketAddr>,
    sup: Arc<Supervisor>,
    io: Arc<Mutex<Option<Arc<UdpIo>>>>,
}

impl UdpEntity {
    /// A UDP entity bound to `local`, or to a wildcard ephemeral address
    /// when `None`.
    pub fn new(ctx: &IoContext, local: Option<SocketAddr>) -> Self {
        Self {
            ctx: ctx.clone(),
            local,
            sup: Arc::new(Supervisor::new()),
            io: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the entity is running.
    pub fn is_started(&self) -> bool {
        self.sup.is_started()
    }

    /// The bound endpoint, once the handler exists.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.io.lock().unwrap().as_ref().map(|io| io.local_addr())
    }

    /// Bind the socket and hand the handler to the state-change callback.
    /// Returns `false` if the entity already ran its start cycle.
    pub fn start<S, E>(&self, on_state_change: S, on_error: E) -> bool
    where
        S: FnMut(UdpIoHandle, usize, bool) + Send + 'static,
        E: FnMut(UdpIoHandle, Error) + Send + 'static,
    {
        let Some((close_rx, wait_group)) = self.sup.begin() else {
            return false;
        };

        let sup = Arc::clone(&self.sup);
        let slot = Arc::clone(&self.io);
        let bind_addr = self
            .local
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        let on_state_change = Arc::new(Mutex::new(on_state_change));
        let on_error = Arc::new(Mutex::new(on_error));

        let entity_done = wait_group.add(1);
        self.ctx.spawn(async move {
            run_entity(bind_addr, close_rx, sup, slot, on_state_change, on_error).await;
            entity_done.done();
        });
        true
    }

    /// Cancel the handler. Idempotent; `true` only for the call that
    /// effected the transition.
    pub fn stop(&self) -> bool {
        if !self.sup.signal_close() {
            return false;
        }
        if let Some(io) = self.io.lock().unwrap().clone() {
            io.stop_io();
        }
        true
    }

    /// Wait until the entity task (and thus the error callback) has
    /// finished.
    pub async fn wait_for_stop(&self) {
        self.sup.wait().await;
    }

    /// [`stop`](UdpEntity::stop) followed by
    /// [`wait_for_stop`](UdpEntity::wait_for_stop).
    pub async fn graceful_stop(&self) -> bool {
        let transitioned = self.stop();
        self.wait_for_stop().await;
        transitioned
    }
}

async fn run_entity<S, E>(
    bind_addr: SocketAddr,
    mut close_rx: broadcast::Receiver<()>,
    sup: Arc<Supervisor>,
    slot: Arc<Mutex<Option<Arc<UdpIo>>>>,
    on_state_change: Arc<Mutex<S>>,
    on_error: Arc<Mutex<E>>,
) where
    S: FnMut(UdpIoHandle, usize, bool) + Send + 'static,
    E: FnMut(UdpIoHandle, Error) + Send + 'static,
{
    let report = |err: Error| {
        let mut cb = on_error.lock().unwrap();
        (*cb)(IoHandle::default(), err);
    };

    let socket = tokio::select! {
        _ = close_rx.recv() => {
            report(Error::IoCancelled);
            sup.mark_stopped();
            return;
        }
        res = UdpSocket::bind(bind_addr) => match res {
            Ok(socket) => socket,
            Err(err) => {
                report(err.into());
                sup.mark_stopped();
                return;
            }
        }
    };

    let io = match UdpIo::from_socket(socket) {
        Ok(io) => io,
        Err(err) => {
            report(err);
            sup.mark_stopped();
            return;
        }
    };
    trace!("udp entity bound to {}", io.local_addr());
    *slot.lock().unwrap() = Some(Arc::clone(&io));
    let handle = IoHandle::new(Arc::downgrade(&io));

    {
        let mut cb = on_state_change.lock().unwrap();
        (*cb)(handle.clone(), 1, true);
    }
    if sup.is_closing() {
        io.stop_io();
    }

    let reason = Arc::clone(&io).drive().await;

    {
        let mut cb = on_error.lock().unwrap();
        (*cb)(handle.clone(), reason);
    }
    slot.lock().unwrap().take();
    {
        let mut cb = on_state_change.lock().unwrap();
        (*cb)(handle, 0, false);
    }
    sup.mark_stopped();
}
