use std::sync::Mutex;

use bytes::Bytes;

use netmux::{IoCore, IoHandle, OutputQueueStats};

/// A thread-safe collection of handles with broadcast send.
///
/// Handles whose referent has gone away are skipped silently on send and
/// excluded from the stats total, but stay in the collection until
/// [`remove`](SendToAll::remove)d; removals during a broadcast on
/// another thread simply take effect on the next send.
pub struct SendToAll<T: IoCore> {
    members: Mutex<Vec<IoHandle<T>>>,
}

impl<T: IoCore> Default for SendToAll<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IoCore> SendToAll<T> {
    /// An empty collection.
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Vec::new()),
        }
    }

    /// Add a handle. Duplicates and invalid handles are accepted.
    pub fn add(&self, io: IoHandle<T>) {
        self.members.lock().unwrap().push(io);
    }

    /// Remove every handle equal to `io`.
    pub fn remove(&self, io: &IoHandle<T>) {
        self.members.lock().unwrap().retain(|member| member != io);
    }

    /// Queue `buf` on every valid member. Returns how many members
    /// accepted the payload.
    pub fn send(&self, buf: Bytes) -> usize {
        let members = self.members.lock().unwrap();
        members
            .iter()
            .filter(|member| member.send(buf.clone()))
            .count()
    }

    /// Number of handles held, valid or not.
    pub fn len(&self) -> usize {
        self.members.lock().unwrap().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.members.lock().unwrap().is_empty()
    }

    /// Field-wise sum of the queue stats of every valid member.
    pub fn total_queue_stats(&self) -> OutputQueueStats {
        let members = self.members.lock().unwrap();
        let mut total = OutputQueueStats::default();
        for member in members.iter() {
            if let Ok(stats) = member.queue_stats() {
                total.size += stats.size;
                total.bytes_in_queue += stats.bytes_in_queue;
            }
        }
        total
    }
}
