use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::trace;
use tokio::net::UdpSocket;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::handle::{IoCore, IoHandle, MessageHandler, UdpIoHandle};
use crate::queue::{OutputQueue, OutputQueueStats};
use crate::tcp::Phase;

/// Largest datagram payload deliverable over IPv4 UDP; also the default
/// receive buffer size.
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Start configuration for a UDP handler.
///
/// The four constructors mirror the four ways a UDP endpoint is used:
/// receiving from anyone, bound to one remote (which then serves as both
/// the default send destination and a receive filter), or send-only with
/// or without a default destination.
pub struct UdpStart {
    max_size: usize,
    remote: Option<SocketAddr>,
    on_message: Option<MessageHandler<UdpIo>>,
}

impl UdpStart {
    /// Receive datagrams from any sender.
    pub fn receiving<F>(max_size: usize, on_message: F) -> Self
    where
        F: FnMut(Bytes, UdpIoHandle, SocketAddr) -> bool + Send + 'static,
    {
        Self {
            max_size,
            remote: None,
            on_message: Some(Box::new(on_message)),
        }
    }

    /// Exchange datagrams with one remote: sends default to it and
    /// datagrams from any other sender are dropped.
    pub fn bound<F>(remote: SocketAddr, max_size: usize, on_message: F) -> Self
    where
        F: FnMut(Bytes, UdpIoHandle, SocketAddr) -> bool + Send + 'static,
    {
        Self {
            max_size,
            remote: Some(remote),
            on_message: Some(Box::new(on_message)),
        }
    }

    /// Send-only; every `send` must carry an explicit destination.
    pub fn send_only() -> Self {
        Self {
            max_size: MAX_UDP_PAYLOAD,
            remote: None,
            on_message: None,
        }
    }

    /// Send-only with a default destination.
    pub fn send_only_to(remote: SocketAddr) -> Self {
        Self {
            max_size: MAX_UDP_PAYLOAD,
            remote: Some(remote),
            on_message: None,
        }
    }

    /// The configured default remote, if any.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Whether this configuration reads datagrams at all.
    pub fn is_receiving(&self) -> bool {
        self.on_message.is_some()
    }
}

/// Singleton-per-endpoint UDP I/O handler.
///
/// Same lifecycle as [`TcpIo`](crate::TcpIo), but there is no framing
/// (every datagram is one message) and no drain on close: pending writes
/// are best-effort and shutdown cancels in-flight operations.
pub struct UdpIo {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    phase: Mutex<Phase>,
    pending: Mutex<Option<UdpStart>>,
    default_remote: Mutex<Option<SocketAddr>>,
    queue: OutputQueue,
    start_notify: Notify,
    write_notify: Notify,
    close_notify: Notify,
}

impl UdpIo {
    /// Wrap a bound socket.
    pub fn from_socket(socket: UdpSocket) -> Result<Arc<Self>> {
        let local = socket.local_addr()?;
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            local,
            phase: Mutex::new(Phase::Created),
            pending: Mutex::new(None),
            default_remote: Mutex::new(None),
            queue: OutputQueue::new(),
            start_notify: Notify::new(),
            write_notify: Notify::new(),
            close_notify: Notify::new(),
        }))
    }

    /// Local endpoint of the socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// Apply a start configuration, transitioning `Created -> Started` and
    /// waking the driver. Fails with [`Error::AlreadyStarted`] on any later
    /// call, including after stop.
    pub fn start_io(&self, start: UdpStart) -> Result<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != Phase::Created {
                return Err(Error::AlreadyStarted);
            }
            *phase = Phase::Started;
        }
        *self.default_remote.lock().unwrap() = start.remote;
        *self.pending.lock().unwrap() = Some(start);
        self.start_notify.notify_one();
        Ok(())
    }

    fn enter_stopping(&self) {
        let mut phase = self.phase.lock().unwrap();
        if *phase == Phase::Started {
            *phase = Phase::Stopping;
        }
    }

    fn finish(&self) {
        *self.phase.lock().unwrap() = Phase::Stopped;
        self.queue.clear();
    }

    /// Run the endpoint to completion and return the termination reason.
    /// Called exactly once by the owning supervisor's task.
    pub async fn drive(self: Arc<Self>) -> Error {
        let start = loop {
            match self.phase() {
                Phase::Stopping | Phase::Stopped => {
                    self.finish();
                    return Error::IoCancelled;
                }
                _ => {}
            }
            if let Some(start) = self.pending.lock().unwrap().take() {
                break start;
            }
            tokio::select! {
                _ = self.start_notify.notified() => {}
                _ = self.close_notify.notified() => {}
            }
        };

        let reason = self.run(start).await;
        self.finish();
        trace!("udp endpoint on {} is down: {}", self.local, reason);
        reason
    }

    async fn run(self: &Arc<Self>, start: UdpStart) -> Error {
        let receiving = start.is_receiving();
        let bound_remote = start.remote;
        let mut on_message = start.on_message;
        let handle = IoHandle::new(Arc::downgrade(self));
        let mut buf = vec![0u8; start.max_size];

        loop {
            tokio::select! {
                biased;

                // No drain on close: cancellation discards pending writes.
                _ = self.close_notify.notified() => {
                    return Error::IoCancelled;
                }
                _ = self.write_notify.notified() => {
                    if let Err(err) = self.flush().await {
                        self.enter_stopping();
                        return err;
                    }
                }
                res = self.socket.recv_from(&mut buf), if receiving => {
                    match res {
                        Ok((n, from)) => {
                            if let Some(remote) = bound_remote {
                                if from != remote {
                                    trace!("dropping datagram from unbound sender {}", from);
                                    continue;
                                }
                            }
                            trace!("socket read {} bytes from {}", n, from);
                            let msg = Bytes::copy_from_slice(&buf[..n]);
                            let keep_going = match on_message.as_mut() {
                                Some(cb) => cb(msg, handle.clone(), from),
                                None => true,
                            };
                            if !keep_going {
                                self.enter_stopping();
                                return Error::MessageHandlerTerminated;
                            }
                        }
                        Err(err) => {
                            self.enter_stopping();
                            return err.into();
                        }
                    }
                }
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        while let Some(entry) = self.queue.try_pop() {
            // send() resolves the destination at enqueue time.
            let Some(dest) = entry.dest else { continue };
            let n = self.socket.send_to(&entry.buf, dest).await?;
            trace!("socket write {} bytes to {}", n, dest);
        }
        Ok(())
    }

    fn enqueue(&self, buf: Bytes, dest: SocketAddr) -> Result<()> {
        if self.phase() != Phase::Started {
            return Err(Error::NotStarted);
        }
        self.queue.push(buf, Some(dest));
        self.write_notify.notify_one();
        Ok(())
    }
}

impl IoCore for UdpIo {
    type Socket = UdpSocket;

    fn is_io_started(&self) -> bool {
        self.phase() == Phase::Started
    }

    fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    fn queue_stats(&self) -> OutputQueueStats {
        self.queue.stats()
    }

    fn send(&self, buf: Bytes) -> Result<()> {
        let dest = self.default_remote.lock().unwrap().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "send without destination on a udp handler with no default remote",
            ))
        })?;
        self.enqueue(buf, dest)
    }

    fn send_to(&self, buf: Bytes, dest: SocketAddr) -> Result<()> {
        self.enqueue(buf, dest)
    }

    fn stop_io(&self) -> bool {
        let transitioned = {
            let mut phase = self.phase.lock().unwrap();
            match *phase {
                Phase::Created => {
                    *phase = Phase::Stopped;
                    true
                }
                Phase::Started => {
                    *phase = Phase::Stopping;
                    true
                }
                Phase::Stopping | Phase::Stopped => false,
            }
        };
        if transitioned {
            self.close_notify.notify_one();
        }
        transitioned
    }
}

impl IoHandle<UdpIo> {
    /// Apply a start configuration to the referent, launching its
    /// datagram loop. `true` only on the first call against a live
    /// handler.
    pub fn start_io(&self, start: UdpStart) -> bool {
        match self.upgrade() {
            Ok(io) => io.start_io(start).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_variants() {
        let remote: SocketAddr = "127.0.0.1:4433".parse().unwrap();

        let recv = UdpStart::receiving(2048, |_, _, _| true);
        assert!(recv.is_receiving());
        assert_eq!(recv.remote(), None);

        let bound = UdpStart::bound(remote, 2048, |_, _, _| true);
        assert!(bound.is_receiving());
        assert_eq!(bound.remote(), Some(remote));

        let send_only = UdpStart::send_only();
        assert!(!send_only.is_receiving());
        assert_eq!(send_only.max_size, MAX_UDP_PAYLOAD);

        let send_to = UdpStart::send_only_to(remote);
        assert!(!send_to.is_receiving());
        assert_eq!(send_to.remote(), Some(remote));
    }

    #[tokio::test]
    async fn lifecycle_flags() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let io = UdpIo::from_socket(socket).unwrap();

        assert!(!io.is_io_started());
        assert!(matches!(
            io.send(Bytes::from_static(b"x")),
            Err(Error::Io(_))
        ));

        io.start_io(UdpStart::send_only_to("127.0.0.1:4433".parse().unwrap()))
            .unwrap();
        assert!(io.is_io_started());
        assert!(matches!(
            io.start_io(UdpStart::send_only()),
            Err(Error::AlreadyStarted)
        ));

        assert!(io.stop_io());
        assert!(!io.is_io_started());
        assert!(!io.stop_io());
    }

    #[tokio::test]
    async fn send_requires_destination_or_default() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let io = UdpIo::from_socket(socket).unwrap();
        io.start_io(UdpStart::send_only()).unwrap();

        // No default remote configured: endpoint-less send is rejected...
        assert!(matches!(
            io.send(Bytes::from_static(b"x")),
            Err(Error::Io(_))
        ));
        assert_eq!(io.queue_stats(), OutputQueueStats::default());

        // ...but an explicit destination is accepted.
        let dest: SocketAddr = "127.0.0.1:4433".parse().unwrap();
        io.send_to(Bytes::from_static(b"xy"), dest).unwrap();
        assert_eq!(io.queue_stats().size, 1);
        assert_eq!(io.queue_stats().bytes_in_queue, 2);
    }
}
