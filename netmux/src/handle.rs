use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::queue::OutputQueueStats;

/// The surface an I/O handler exposes to its weak handle.
///
/// Implemented by [`TcpIo`](crate::TcpIo) and [`UdpIo`](crate::UdpIo);
/// custom supervisors can drive any implementor through [`IoHandle`].
pub trait IoCore: Send + Sync + 'static {
    /// The owned socket type (`tokio::net::TcpStream` / `UdpSocket`).
    type Socket;

    /// Whether the handler is currently in its started phase.
    fn is_io_started(&self) -> bool;

    /// Shared reference to the underlying socket, for option setting.
    fn socket(&self) -> Arc<Self::Socket>;

    /// Snapshot of the pending-write queue.
    fn queue_stats(&self) -> OutputQueueStats;

    /// Queue a payload for the handler's default destination.
    fn send(&self, buf: Bytes) -> Result<()>;

    /// Queue a payload for an explicit destination. TCP handlers have a
    /// fixed peer and ignore the endpoint, matching `send`.
    fn send_to(&self, buf: Bytes, dest: SocketAddr) -> Result<()>;

    /// Begin shutdown. Returns `true` if this call effected the transition.
    fn stop_io(&self) -> bool;
}

/// Message delivery callback: one complete frame, a handle to the I/O
/// handler it arrived on, and the peer endpoint. Returning `false` asks the
/// runtime to close the connection after pending writes drain.
pub type MessageHandler<T> = Box<dyn FnMut(Bytes, IoHandle<T>, SocketAddr) -> bool + Send>;

/// Fired by a supervisor when a handler is created (`started == true`) or
/// destroyed (`false`), with the supervisor's current handler count.
pub type StateChangeFn<T> = Box<dyn FnMut(IoHandle<T>, usize, bool) + Send>;

/// Fired by a supervisor when a handler terminates, with the reason.
pub type ErrorFn<T> = Box<dyn FnMut(IoHandle<T>, Error) + Send>;

/// A non-owning, thread-safe facade over an I/O handler.
///
/// The handler itself is shared-owned by its supervisor and its in-flight
/// driver task; the handle holds only a weak reference and upgrades it per
/// call. Every operation is total: once the handler is gone, calls fail
/// with [`Error::InvalidHandle`] (or return `false`) instead of panicking
/// or blocking. A default-constructed handle is permanently invalid.
///
/// Handles are cheap to clone and may be stored in ordered containers:
/// equality and ordering are keyed on the handler's control-block address,
/// with invalid handles comparing equal to each other and strictly less
/// than any valid handle.
pub struct IoHandle<T> {
    inner: Weak<T>,
}

/// Handle to a TCP connection handler.
pub type TcpIoHandle = IoHandle<crate::TcpIo>;

/// Handle to a UDP endpoint handler.
pub type UdpIoHandle = IoHandle<crate::UdpIo>;

impl<T> Default for IoHandle<T> {
    fn default() -> Self {
        Self { inner: Weak::new() }
    }
}

impl<T> Clone for IoHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: IoCore> IoHandle<T> {
    /// Create a handle from a weak reference to a handler. Supervisors use
    /// this when handing new handlers to user callbacks.
    pub fn new(inner: Weak<T>) -> Self {
        Self { inner }
    }

    pub(crate) fn upgrade(&self) -> Result<Arc<T>> {
        self.inner.upgrade().ok_or(Error::InvalidHandle)
    }

    /// Whether the referent is still alive.
    pub fn is_valid(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Whether the handler has been started and not yet stopped.
    pub fn is_io_started(&self) -> Result<bool> {
        Ok(self.upgrade()?.is_io_started())
    }

    /// Shared reference to the handler's socket, e.g. to set options such
    /// as `set_nodelay` or `set_ttl`.
    pub fn socket(&self) -> Result<Arc<T::Socket>> {
        Ok(self.upgrade()?.socket())
    }

    /// Snapshot of the handler's pending-write queue.
    pub fn queue_stats(&self) -> Result<OutputQueueStats> {
        Ok(self.upgrade()?.queue_stats())
    }

    /// Queue a payload for the handler's default destination. Returns
    /// `false` if the handle is invalid or the handler is not started.
    pub fn send(&self, buf: Bytes) -> bool {
        self.upgrade().and_then(|io| io.send(buf)).is_ok()
    }

    /// Queue a payload for an explicit destination (UDP); TCP handlers
    /// ignore the endpoint.
    pub fn send_to(&self, buf: Bytes, dest: SocketAddr) -> bool {
        self.upgrade().and_then(|io| io.send_to(buf, dest)).is_ok()
    }

    /// Begin shutdown of the handler. Returns `true` only if this call
    /// effected the transition.
    pub fn stop_io(&self) -> bool {
        self.upgrade().map(|io| io.stop_io()).unwrap_or(false)
    }

    /// Identity key: the control-block address while the referent lives.
    fn ident(&self) -> Option<usize> {
        self.inner.upgrade().map(|arc| Arc::as_ptr(&arc) as usize)
    }
}

impl<T: IoCore> PartialEq for IoHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ident() == other.ident()
    }
}

impl<T: IoCore> Eq for IoHandle<T> {}

impl<T: IoCore> PartialOrd for IoHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IoCore> Ord for IoHandle<T> {
    // `None < Some(_)`, so invalid handles sort before every valid one.
    fn cmp(&self, other: &Self) -> Ordering {
        self.ident().cmp(&other.ident())
    }
}

impl<T> fmt::Debug for IoHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoHandle")
            .field("valid", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    struct FakeIo {
        started: bool,
        sent: Mutex<Vec<Bytes>>,
    }

    impl FakeIo {
        fn new(started: bool) -> Arc<Self> {
            Arc::new(Self {
                started,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl IoCore for FakeIo {
        type Socket = ();

        fn is_io_started(&self) -> bool {
            self.started
        }

        fn socket(&self) -> Arc<()> {
            Arc::new(())
        }

        fn queue_stats(&self) -> OutputQueueStats {
            OutputQueueStats {
                size: 42,
                bytes_in_queue: 43,
            }
        }

        fn send(&self, buf: Bytes) -> crate::Result<()> {
            if !self.started {
                return Err(Error::NotStarted);
            }
            self.sent.lock().unwrap().push(buf);
            Ok(())
        }

        fn send_to(&self, buf: Bytes, _dest: SocketAddr) -> crate::Result<()> {
            self.send(buf)
        }

        fn stop_io(&self) -> bool {
            self.started
        }
    }

    fn handle_of(io: &Arc<FakeIo>) -> IoHandle<FakeIo> {
        IoHandle::new(Arc::downgrade(io))
    }

    #[test]
    fn default_handle_is_totally_invalid() {
        let h: IoHandle<FakeIo> = IoHandle::default();
        let endp: SocketAddr = "127.0.0.1:9".parse().unwrap();

        assert!(!h.is_valid());
        assert!(matches!(h.is_io_started(), Err(Error::InvalidHandle)));
        assert!(matches!(h.socket(), Err(Error::InvalidHandle)));
        assert!(matches!(h.queue_stats(), Err(Error::InvalidHandle)));
        assert!(!h.send(Bytes::from_static(b"x")));
        assert!(!h.send_to(Bytes::from_static(b"x"), endp));
        assert!(!h.stop_io());
    }

    #[test]
    fn handle_delegates_to_live_handler() {
        let io = FakeIo::new(true);
        let h = handle_of(&io);

        assert!(h.is_valid());
        assert_eq!(h.is_io_started().unwrap(), true);
        assert_eq!(h.queue_stats().unwrap().size, 42);
        assert_eq!(h.queue_stats().unwrap().bytes_in_queue, 43);
        assert!(h.send(Bytes::from_static(b"payload")));
        assert!(h.stop_io());
        assert_eq!(io.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn send_fails_on_unstarted_handler() {
        let io = FakeIo::new(false);
        let h = handle_of(&io);
        assert!(h.is_valid());
        assert!(!h.send(Bytes::from_static(b"early")));
    }

    #[test]
    fn handle_outliving_handler_becomes_invalid() {
        let io = FakeIo::new(true);
        let h = handle_of(&io);
        assert!(h.is_valid());
        drop(io);
        assert!(!h.is_valid());
        assert!(!h.send(Bytes::from_static(b"late")));
        assert!(matches!(h.is_io_started(), Err(Error::InvalidHandle)));
    }

    #[test]
    fn equality_is_by_handler_identity() {
        let a = FakeIo::new(true);
        let b = FakeIo::new(true);

        let h1 = handle_of(&a);
        let h2 = handle_of(&a);
        let h3 = handle_of(&b);
        let invalid1: IoHandle<FakeIo> = IoHandle::default();
        let invalid2: IoHandle<FakeIo> = IoHandle::default();

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(invalid1, invalid2);
        assert_ne!(invalid1, h1);

        // A handle whose referent died compares equal to a default one.
        let dead = {
            let tmp = FakeIo::new(true);
            handle_of(&tmp)
        };
        assert_eq!(dead, invalid1);
    }

    #[test]
    fn invalid_sorts_before_valid() {
        let a = FakeIo::new(true);
        let b = FakeIo::new(true);
        let h1 = handle_of(&a);
        let h2 = handle_of(&b);
        let invalid: IoHandle<FakeIo> = IoHandle::default();

        assert!(invalid < h1);
        assert!(invalid < h2);
        assert_eq!(invalid.cmp(&invalid), Ordering::Equal);

        let mut set = BTreeSet::new();
        set.insert(h1.clone());
        set.insert(h2.clone());
        set.insert(handle_of(&a)); // duplicate of h1
        set.insert(IoHandle::default());
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().filter(|h| !h.is_valid()).count(), 1);
    }
}
