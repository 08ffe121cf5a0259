//! Utility code shared between the supervisor integration tests.
//!
//! The general strategy: message senders and message receivers, with a
//! flag deciding whether the receiver loops messages back. Senders are
//! plain blocking-socket threads; receivers are library supervisors with
//! a counting message handler. When a flow is finished the sender emits
//! an empty-body message, which the receiving handler answers (in reply
//! mode) and then treats as end-of-flow by returning `false`.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use netmux::{IoCore, IoHandle, TcpIoHandle};
use netmux_codec::{encode_with_len_header, DelimiterFramer, VariableFramer};

pub type Counter = Arc<AtomicUsize>;

pub fn counter() -> Counter {
    Arc::new(AtomicUsize::new(0))
}

pub fn variable_len_msg(body: &[u8]) -> Bytes {
    encode_with_len_header(body, 2)
}

pub fn cr_lf_msg(body: &[u8]) -> Bytes {
    let mut msg = body.to_vec();
    msg.extend_from_slice(b"\r\n");
    Bytes::from(msg)
}

pub fn lf_msg(body: &[u8]) -> Bytes {
    let mut msg = body.to_vec();
    msg.extend_from_slice(b"\n");
    Bytes::from(msg)
}

pub fn empty_msg(encode: fn(&[u8]) -> Bytes) -> Bytes {
    encode(b"")
}

/// Bodies are `prefix` plus 1..=num repetitions of `body_char`, so every
/// message in a set has a distinct length.
pub fn make_msg_set(
    encode: fn(&[u8]) -> Bytes,
    prefix: &str,
    body_char: u8,
    num: usize,
) -> Vec<Bytes> {
    (1..=num)
        .map(|i| {
            let mut body = prefix.as_bytes().to_vec();
            body.extend(std::iter::repeat(body_char).take(i));
            encode(&body)
        })
        .collect()
}

/// The shared receiving handler: counts data messages, optionally loops
/// them back, and treats any frame of `empty_len` bytes or less (header
/// or delimiter only) as end-of-flow.
pub fn counting_handler<T: IoCore>(
    count: Counter,
    reply: bool,
    empty_len: usize,
) -> impl FnMut(Bytes, IoHandle<T>, SocketAddr) -> bool + Send + 'static {
    move |msg, io, peer| {
        if msg.len() > empty_len {
            count.fetch_add(1, Ordering::SeqCst);
            if reply {
                io.send_to(msg, peer);
            }
            return true;
        }
        if reply {
            // may not make it back to the sender if teardown wins the race
            io.send_to(msg, peer);
        }
        false
    }
}

/// `start_io` for the two TCP framings under test: variable-length when
/// `delim` is `None`, delimiter framing otherwise.
pub fn tcp_start_io(
    io: &TcpIoHandle,
    reply: bool,
    delim: Option<&'static [u8]>,
    count: Counter,
) -> bool {
    match delim {
        None => io.start_io(
            Box::new(VariableFramer::big_endian(2)),
            counting_handler(count, reply, 2),
        ),
        Some(delim) => io.start_io(
            Box::new(DelimiterFramer::new(delim, 8192)),
            counting_handler(count, reply, delim.len()),
        ),
    }
}

/// Blocking sender peer: writes the message set, optionally reading each
/// message back, then signals end-of-flow with an empty-body message.
/// Returns the number of data messages written.
pub fn run_peer(addr: SocketAddr, msgs: Vec<Bytes>, read_reply: bool, empty: Bytes) -> usize {
    let mut sock = std::net::TcpStream::connect(addr).unwrap();
    let mut sent = 0;
    let mut reply = Vec::new();
    for msg in &msgs {
        sock.write_all(msg).unwrap();
        sent += 1;
        if read_reply {
            reply.resize(msg.len(), 0);
            sock.read_exact(&mut reply).unwrap();
            assert_eq!(&reply[..], &msg[..], "echo differs from sent message");
        }
    }
    sock.write_all(&empty).unwrap();
    if read_reply {
        reply.resize(empty.len(), 0);
        // teardown races the looped-back empty message; either is fine
        let _ = sock.read_exact(&mut reply);
    }
    sent
}

/// A started worker with opt-in logging (`RUST_LOG=trace` to see the
/// handler runtime's tracing).
pub fn test_worker(name: &str) -> netmux_executor::Worker {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut worker = netmux_executor::Worker::new(name);
    assert!(worker.start());
    worker
}

/// Spin until `cond` holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);
