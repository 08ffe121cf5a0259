use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{trace, warn};
use tokio::net::{TcpListener, TcpSocket};

use netmux::{Error, IoCore, IoHandle, Result, TcpIo, TcpIoHandle};
use netmux_executor::IoContext;

use crate::Supervisor;

const LISTEN_BACKLOG: u32 = 1024;

/// Listens on a local endpoint and supervises one [`TcpIo`] per accepted
/// connection.
///
/// Construction binds and listens eagerly, so [`local_addr`]
/// (TcpAcceptor::local_addr) is available immediately, including a
/// kernel-assigned port when binding port 0. `start` launches the accept
/// loop; each accepted connection runs on its own task through the
/// create / state-change / drive / error / state-change lifecycle
/// described at the [crate root](crate).
pub struct TcpAcceptor {
    ctx: IoContext,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    sup: Arc<Supervisor>,
    conns: Arc<Mutex<Vec<Arc<TcpIo>>>>,
}

impl TcpAcceptor {
    /// Bind and listen on `local`. With `reuse_addr`, the listening
    /// socket sets `SO_REUSEADDR` before binding.
    pub fn new(ctx: &IoContext, local: SocketAddr, reuse_addr: bool) -> Result<Self> {
        // Socket registration needs the reactor; entering the context
        // lets callers construct acceptors from any thread.
        let _guard = ctx.enter();
        let socket = if local.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(reuse_addr)?;
        socket.bind(local)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            ctx: ctx.clone(),
            local_addr,
            listener: Mutex::new(Some(listener)),
            sup: Arc::new(Supervisor::new()),
            conns: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// The bound listening endpoint.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live connection handlers.
    pub fn active_handlers(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    /// Whether the accept loop is running.
    pub fn is_started(&self) -> bool {
        self.sup.is_started()
    }

    /// Launch the accept loop, registering the two lifecycle callbacks.
    /// Returns `false` if the acceptor already ran its start cycle.
    pub fn start<S, E>(&self, on_state_change: S, on_error: E) -> bool
    where
        S: FnMut(TcpIoHandle, usize, bool) + Send + 'static,
        E: FnMut(TcpIoHandle, Error) + Send + 'static,
    {
        let Some((mut close_rx, wait_group)) = self.sup.begin() else {
            return false;
        };
        let Some(listener) = self.listener.lock().unwrap().take() else {
            self.sup.mark_stopped();
            return false;
        };

        let sup = Arc::clone(&self.sup);
        let conns = Arc::clone(&self.conns);
        let on_state_change = Arc::new(Mutex::new(on_state_change));
        let on_error = Arc::new(Mutex::new(on_error));
        let ctx = self.ctx.clone();

        let acceptor_done = wait_group.add(1);
        self.ctx.spawn(async move {
            loop {
                tokio::select! {
                    _ = close_rx.recv() => {
                        trace!("listener exit loop");
                        break;
                    }
                    res = listener.accept() => {
                        match res {
                            Ok((stream, peer_addr)) => {
                                trace!("accepted connection from {}", peer_addr);
                                let io = match TcpIo::from_stream(stream) {
                                    Ok(io) => io,
                                    Err(err) => {
                                        warn!("dropping accepted socket: {}", err);
                                        continue;
                                    }
                                };
                                let conn_done = wait_group.add(1);
                                let sup = Arc::clone(&sup);
                                let conns = Arc::clone(&conns);
                                let on_state_change = Arc::clone(&on_state_change);
                                let on_error = Arc::clone(&on_error);
                                ctx.spawn(async move {
                                    run_connection(io, sup, conns, on_state_change, on_error).await;
                                    conn_done.done();
                                });
                            }
                            Err(err) => {
                                warn!("listener accept error {}", err);
                                break;
                            }
                        }
                    }
                }
            }
            sup.mark_stopped();
            acceptor_done.done();
        });
        true
    }

    /// Cancel the accept loop and request `stop_io` on every live
    /// handler. Idempotent; `true` only for the call that effected the
    /// transition.
    pub fn stop(&self) -> bool {
        if !self.sup.signal_close() {
            return false;
        }
        let snapshot: Vec<Arc<TcpIo>> = self.conns.lock().unwrap().clone();
        for io in snapshot {
            io.stop_io();
        }
        true
    }

    /// Wait until the accept loop and every connection task (and thus
    /// every error callback) has finished.
    pub async fn wait_for_stop(&self) {
        self.sup.wait().await;
    }

    /// [`stop`](TcpAcceptor::stop) followed by
    /// [`wait_for_stop`](TcpAcceptor::wait_for_stop). Must not be awaited
    /// from inside one of this acceptor's own callbacks.
    pub async fn graceful_stop(&self) -> bool {
        let transitioned = self.stop();
        self.wait_for_stop().await;
        transitioned
    }
}

/// One connection's lifecycle: insert, created state-change, drive to
/// completion, error callback, remove, destroyed state-change. The error
/// callback strictly precedes the destroyed state-change.
async fn run_connection<S, E>(
    io: Arc<TcpIo>,
    sup: Arc<Supervisor>,
    conns: Arc<Mutex<Vec<Arc<TcpIo>>>>,
    on_state_change: Arc<Mutex<S>>,
    on_error: Arc<Mutex<E>>,
) where
    S: FnMut(TcpIoHandle, usize, bool) + Send + 'static,
    E: FnMut(TcpIoHandle, Error) + Send + 'static,
{
    let handle = IoHandle::new(Arc::downgrade(&io));

    let count = {
        let mut conns = conns.lock().unwrap();
        conns.push(Arc::clone(&io));
        conns.len()
    };
    {
        let mut cb = on_state_change.lock().unwrap();
        (*cb)(handle.clone(), count, true);
    }
    // stop() may have raced the insert; make sure this handler hears it.
    if sup.is_closing() {
        io.stop_io();
    }

    let reason = Arc::clone(&io).drive().await;

    {
        let mut cb = on_error.lock().unwrap();
        (*cb)(handle.clone(), reason);
    }
    let count = {
        let mut conns = conns.lock().unwrap();
        conns.retain(|entry| !Arc::ptr_eq(entry, &io));
        conns.len()
    };
    {
        let mut cb = on_state_change.lock().unwrap();
        (*cb)(handle, count, false);
    }
}
