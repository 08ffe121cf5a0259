use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use bytes::Bytes;

/// Snapshot of an output queue, taken atomically under the queue lock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutputQueueStats {
    /// Number of queued messages.
    pub size: usize,
    /// Sum of the payload lengths of all queued messages.
    pub bytes_in_queue: usize,
}

/// One pending write: the payload and, for UDP, the resolved destination.
#[derive(Debug)]
pub(crate) struct OutEntry {
    pub(crate) buf: Bytes,
    pub(crate) dest: Option<SocketAddr>,
}

/// Ordered, thread-safe queue of pending writes with byte accounting.
///
/// This is the only cross-thread surface of an I/O handler: `send` on any
/// thread pushes here, the handler's driver task pops on the reactor.
#[derive(Debug, Default)]
pub struct OutputQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<OutEntry>,
    bytes: usize,
}

impl OutputQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, buf: Bytes, dest: Option<SocketAddr>) {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes += buf.len();
        inner.entries.push_back(OutEntry { buf, dest });
    }

    pub(crate) fn try_pop(&self) -> Option<OutEntry> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entries.pop_front()?;
        inner.bytes -= entry.buf.len();
        Some(entry)
    }

    /// Discard everything. Called once when a handler reaches its terminal
    /// state; callers never observe the cleared entries.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.bytes = 0;
    }

    /// Message-count and byte-count snapshot, consistent under the lock.
    pub fn stats(&self) -> OutputQueueStats {
        let inner = self.inner.lock().unwrap();
        OutputQueueStats {
            size: inner.entries.len(),
            bytes_in_queue: inner.bytes,
        }
    }
}
