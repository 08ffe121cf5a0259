use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{trace, warn};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use netmux::{Error, IoCore, IoHandle, TcpIo, TcpIoHandle};
use netmux_executor::IoContext;

use crate::Supervisor;

/// Dials a remote endpoint and supervises the resulting single [`TcpIo`].
///
/// By default one connect attempt is made; [`retry_interval`]
/// (TcpConnector::retry_interval) enables timed retries, optionally capped
/// by [`max_attempts`](TcpConnector::max_attempts). A successful session
/// fires `on_state_change(handle, 1, true)`; when it ends the connector
/// fires `on_error` then `on_state_change(handle, 0, false)` and stops;
/// there is no automatic reconnect after a session.
pub struct TcpConnector {
    ctx: IoContext,
    remote: SocketAddr,
    retry_interval: Option<Duration>,
    max_attempts: u32,
    sup: Arc<Supervisor>,
    conn: Arc<Mutex<Option<Arc<TcpIo>>>>,
}

impl TcpConnector {
    /// A connector for `remote` with no retry.
    pub fn new(ctx: &IoContext, remote: SocketAddr) -> Self {
        Self {
            ctx: ctx.clone(),
            remote,
            retry_interval: None,
            max_attempts: 1,
            sup: Arc::new(Supervisor::new()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Retry failed connect attempts after `interval`. Unless
    /// [`max_attempts`](TcpConnector::max_attempts) caps them, retries
    /// continue until `stop`.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        if self.max_attempts == 1 {
            self.max_attempts = u32::MAX;
        }
        self
    }

    /// Cap the total number of connect attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        assert!(attempts > 0, "at least one connect attempt is required");
        self.max_attempts = attempts;
        self
    }

    /// Whether a connect attempt or session is in progress.
    pub fn is_started(&self) -> bool {
        self.sup.is_started()
    }

    /// The target endpoint.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Begin dialing. Returns `false` if the connector already ran its
    /// start cycle.
    pub fn start<S, E>(&self, on_state_change: S, on_error: E) -> bool
    where
        S: FnMut(TcpIoHandle, usize, bool) + Send + 'static,
        E: FnMut(TcpIoHandle, Error) + Send + 'static,
    {
        let Some((close_rx, wait_group)) = self.sup.begin() else {
            return false;
        };

        let sup = Arc::clone(&self.sup);
        let conn = Arc::clone(&self.conn);
        let remote = self.remote;
        let retry_interval = self.retry_interval;
        let max_attempts = self.max_attempts;
        let on_state_change = Arc::new(Mutex::new(on_state_change));
        let on_error = Arc::new(Mutex::new(on_error));

        let session_done = wait_group.add(1);
        self.ctx.spawn(async move {
            run_session(
                remote,
                retry_interval,
                max_attempts,
                close_rx,
                sup,
                conn,
                on_state_change,
                on_error,
            )
            .await;
            session_done.done();
        });
        true
    }

    /// Cancel the connect attempt or stop the live session. Idempotent;
    /// `true` only for the call that effected the transition.
    pub fn stop(&self) -> bool {
        if !self.sup.signal_close() {
            return false;
        }
        if let Some(io) = self.conn.lock().unwrap().clone() {
            io.stop_io();
        }
        true
    }

    /// Wait until the session task (and thus the error callback) has
    /// finished.
    pub async fn wait_for_stop(&self) {
        self.sup.wait().await;
    }

    /// [`stop`](TcpConnector::stop) followed by
    /// [`wait_for_stop`](TcpConnector::wait_for_stop).
    pub async fn graceful_stop(&self) -> bool {
        let transitioned = self.stop();
        self.wait_for_stop().await;
        transitioned
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session<S, E>(
    remote: SocketAddr,
    retry_interval: Option<Duration>,
    max_attempts: u32,
    mut close_rx: broadcast::Receiver<()>,
    sup: Arc<Supervisor>,
    conn: Arc<Mutex<Option<Arc<TcpIo>>>>,
    on_state_change: Arc<Mutex<S>>,
    on_error: Arc<Mutex<E>>,
) where
    S: FnMut(TcpIoHandle, usize, bool) + Send + 'static,
    E: FnMut(TcpIoHandle, Error) + Send + 'static,
{
    let report = |err: Error| {
        let mut cb = on_error.lock().unwrap();
        (*cb)(IoHandle::default(), err);
    };

    let mut attempt = 0u32;
    let stream = loop {
        attempt += 1;
        tokio::select! {
            _ = close_rx.recv() => {
                trace!("connector to {} cancelled", remote);
                report(Error::IoCancelled);
                sup.mark_stopped();
                return;
            }
            res = TcpStream::connect(remote) => match res {
                Ok(stream) => break stream,
                Err(err) => {
                    warn!("connect attempt {} to {} failed: {}", attempt, remote, err);
                    let retry = match retry_interval {
                        Some(interval) if attempt < max_attempts => interval,
                        _ => {
                            report(err.into());
                            sup.mark_stopped();
                            return;
                        }
                    };
                    tokio::select! {
                        _ = close_rx.recv() => {
                            report(Error::IoCancelled);
                            sup.mark_stopped();
                            return;
                        }
                        _ = tokio::time::sleep(retry) => {}
                    }
                }
            }
        }
    };

    let io = match TcpIo::from_stream(stream) {
        Ok(io) => io,
        Err(err) => {
            report(err);
            sup.mark_stopped();
            return;
        }
    };
    *conn.lock().unwrap() = Some(Arc::clone(&io));
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
    conn.lock().unwrap().take();
    {
        let mut cb = on_state_change.lock().unwrap();
        (*cb)(handle, 0, false);
    }
    sup.mark_stopped();
}
