use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use log::trace;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::framer::Framer;
use crate::handle::{IoCore, IoHandle, MessageHandler, TcpIoHandle};
use crate::queue::{OutputQueue, OutputQueueStats};

const READ_CHUNK: usize = 4096;

/// Lifecycle phase of an I/O handler. `Started` flips on exactly once, via
/// `start_io`, and off exactly once, via `stop_io` or a terminal error; a
/// stopped handler is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Created,
    Started,
    Stopping,
    Stopped,
}

struct TcpStart {
    framer: Box<dyn Framer>,
    on_message: MessageHandler<TcpIo>,
}

/// Per-connection TCP I/O handler.
///
/// Owns one connected socket and runs its read loop and write pump on a
/// single driver task, so per-connection callbacks are strictly
/// serialized. The supervisor that accepted or dialed the connection holds
/// a strong reference and spawns [`drive`](TcpIo::drive); user code holds
/// only weak [`TcpIoHandle`]s.
///
/// The handler is inert until `start_io` installs a framer and a message
/// handler, typically from inside the supervisor's state-change callback.
pub struct TcpIo {
    socket: Arc<TcpStream>,
    local: SocketAddr,
    peer: SocketAddr,
    phase: Mutex<Phase>,
    pending: Mutex<Option<TcpStart>>,
    queue: OutputQueue,
    start_notify: Notify,
    write_notify: Notify,
    close_notify: Notify,
}

impl TcpIo {
    /// Wrap a freshly accepted or connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Arc<Self>> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(Arc::new(Self {
            socket: Arc::new(stream),
            local,
            peer,
            phase: Mutex::new(Phase::Created),
            pending: Mutex::new(None),
            queue: OutputQueue::new(),
            start_notify: Notify::new(),
            write_notify: Notify::new(),
            close_notify: Notify::new(),
        }))
    }

    /// Local endpoint of the connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Peer endpoint of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// Install framing and a message handler, transitioning
    /// `Created -> Started` and waking the driver. Fails with
    /// [`Error::AlreadyStarted`] on any later call, including after stop.
    pub fn start_io<F>(&self, framer: Box<dyn Framer>, on_message: F) -> Result<()>
    where
        F: FnMut(Bytes, TcpIoHandle, SocketAddr) -> bool + Send + 'static,
    {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != Phase::Created {
                return Err(Error::AlreadyStarted);
            }
            *phase = Phase::Started;
        }
        *self.pending.lock().unwrap() = Some(TcpStart {
            framer,
            on_message: Box::new(on_message),
        });
        self.start_notify.notify_one();
        Ok(())
    }

    // Terminal-error path: flips Started -> Stopping without treating the
    // call as a second stop_io.
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

    /// Run the connection to completion and return the termination reason.
    ///
    /// Called exactly once, by the owning supervisor's connection task,
    /// right after the created state-change callback fires. Waits for
    /// `start_io` (or for shutdown), then drives reads, framing, dispatch
    /// and the write pump until the connection ends.
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
        trace!("tcp connection on {} is down: {}", self.peer, reason);
        reason
    }

    async fn run(self: &Arc<Self>, start: TcpStart) -> Error {
        let TcpStart {
            mut framer,
            mut on_message,
        } = start;
        let handle = IoHandle::new(Arc::downgrade(self));
        let mut rdbuf = BytesMut::with_capacity(READ_CHUNK);

        loop {
            tokio::select! {
                biased;

                _ = self.close_notify.notified() => {
                    // stop_io: drain what was queued, then report cancel.
                    return match self.flush().await {
                        Ok(()) => Error::IoCancelled,
                        Err(err) => err,
                    };
                }
                _ = self.write_notify.notified() => {
                    if let Err(err) = self.flush().await {
                        self.enter_stopping();
                        return err;
                    }
                }
                res = self.socket.readable() => {
                    if let Err(err) = res {
                        self.enter_stopping();
                        return err.into();
                    }
                    rdbuf.reserve(READ_CHUNK);
                    match self.socket.try_read_buf(&mut rdbuf) {
                        Ok(0) => {
                            self.enter_stopping();
                            return Error::ConnectionClosed;
                        }
                        Ok(n) => {
                            trace!("stream read {} bytes", n);
                            match Self::dispatch(&mut framer, &mut on_message, &handle, self.peer, &mut rdbuf) {
                                Ok(true) => {}
                                Ok(false) => {
                                    // Message handler asked to close; drain
                                    // pending writes first.
                                    self.enter_stopping();
                                    return match self.flush().await {
                                        Ok(()) => Error::MessageHandlerTerminated,
                                        Err(err) => err,
                                    };
                                }
                                Err(err) => {
                                    self.enter_stopping();
                                    return err;
                                }
                            }
                        }
                        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
                        Err(err) => {
                            self.enter_stopping();
                            return err.into();
                        }
                    }
                }
            }
        }
    }

    fn dispatch(
        framer: &mut Box<dyn Framer>,
        on_message: &mut MessageHandler<TcpIo>,
        handle: &TcpIoHandle,
        peer: SocketAddr,
        rdbuf: &mut BytesMut,
    ) -> Result<bool> {
        while let Some(frame) = framer.decode(rdbuf)? {
            if !on_message(frame, handle.clone(), peer) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn flush(&self) -> Result<()> {
        while let Some(entry) = self.queue.try_pop() {
            let mut buf = entry.buf;
            while !buf.is_empty() {
                self.socket.writable().await?;
                match self.socket.try_write(&buf) {
                    Ok(n) => {
                        trace!("stream write {} bytes", n);
                        buf.advance(n);
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}

impl IoCore for TcpIo {
    type Socket = TcpStream;

    fn is_io_started(&self) -> bool {
        self.phase() == Phase::Started
    }

    fn socket(&self) -> Arc<TcpStream> {
        Arc::clone(&self.socket)
    }

    fn queue_stats(&self) -> OutputQueueStats {
        self.queue.stats()
    }

    fn send(&self, buf: Bytes) -> Result<()> {
        if self.phase() != Phase::Started {
            return Err(Error::NotStarted);
        }
        self.queue.push(buf, None);
        self.write_notify.notify_one();
        Ok(())
    }

    // The peer of a TCP connection is fixed; the endpoint is ignored.
    fn send_to(&self, buf: Bytes, _dest: SocketAddr) -> Result<()> {
        self.send(buf)
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

impl IoHandle<TcpIo> {
    /// Declare framing and install a message handler on the referent,
    /// launching its read loop and write pump. `true` only on the first
    /// call against a live handler.
    pub fn start_io<F>(&self, framer: Box<dyn Framer>, on_message: F) -> bool
    where
        F: FnMut(Bytes, TcpIoHandle, SocketAddr) -> bool + Send + 'static,
    {
        match self.upgrade() {
            Ok(io) => io.start_io(framer, on_message).is_ok(),
            Err(_) => false,
        }
    }
}
