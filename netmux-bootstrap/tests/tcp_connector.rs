//! Connector scenarios: a many-connector two-way echo over LF framing,
//! connect failure and retry, and cancellation of an in-flight dial.

mod common;

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use netmux::Error;
use netmux_bootstrap::{TcpAcceptor, TcpConnector};
use netmux_codec::DelimiterFramer;

use common::*;

/// LF framing, 25 connectors, two-way: the acceptor echoes every frame,
/// each connector reads back exactly what it sent (in order), and the
/// empty `\n` message closes both directions.
#[test]
fn lf_echo_many_connectors_two_way() {
    const CONNECTORS: usize = 25;
    const MSGS: usize = 20;

    let mut worker = test_worker("lf-echo");
    let ctx = worker.context().unwrap();

    let acceptor = TcpAcceptor::new(&ctx, "127.0.0.1:0".parse().unwrap(), true).unwrap();
    let addr = acceptor.local_addr();

    let server_count = counter();
    let (server_err_tx, server_err_rx) = mpsc::channel::<Error>();
    let server_count_cb = Arc::clone(&server_count);
    assert!(acceptor.start(
        move |io, _num, starting| {
            if starting {
                assert!(tcp_start_io(&io, true, Some(b"\n"), Arc::clone(&server_count_cb)));
            }
        },
        move |_io, err| {
            let _ = server_err_tx.send(err);
        },
    ));

    let msgs = make_msg_set(lf_msg, "Echo me!", b'E', MSGS);
    let echo_count = counter();
    let (client_err_tx, client_err_rx) = mpsc::channel::<Error>();

    let connectors: Vec<TcpConnector> = (0..CONNECTORS)
        .map(|_| {
            let connector = TcpConnector::new(&ctx, addr);
            let msgs = msgs.clone();
            let echo_count = Arc::clone(&echo_count);
            let client_err_tx = client_err_tx.clone();
            assert!(connector.start(
                move |io, num, starting| {
                    if !starting {
                        assert_eq!(num, 0);
                        return;
                    }
                    assert_eq!(num, 1);
                    let expected = msgs.clone();
                    let echo_count = Arc::clone(&echo_count);
                    let send_set = msgs.clone();
                    let mut received = 0usize;
                    let started = io.start_io(Box::new(DelimiterFramer::lf()), move |msg, io, _peer| {
                        if msg.len() <= 1 {
                            // looped-back end-of-flow: close this side too
                            return false;
                        }
                        assert_eq!(msg, expected[received], "echo out of order");
                        received += 1;
                        echo_count.fetch_add(1, Ordering::SeqCst);
                        if received == expected.len() {
                            io.send(empty_msg(lf_msg));
                        }
                        true
                    });
                    assert!(started);
                    for msg in &send_set {
                        assert!(io.send(msg.clone()));
                    }
                },
                move |_io, err| {
                    let _ = client_err_tx.send(err);
                },
            ));
            connector
        })
        .collect();
    drop(client_err_tx);

    for _ in 0..CONNECTORS {
        let err = client_err_rx.recv_timeout(TEST_TIMEOUT).unwrap();
        assert!(matches!(err, Error::MessageHandlerTerminated), "{err}");
    }
    for _ in 0..CONNECTORS {
        let err = server_err_rx.recv_timeout(TEST_TIMEOUT).unwrap();
        assert!(matches!(err, Error::MessageHandlerTerminated), "{err}");
    }

    assert_eq!(echo_count.load(Ordering::SeqCst), CONNECTORS * MSGS);
    assert_eq!(server_count.load(Ordering::SeqCst), CONNECTORS * MSGS);

    for connector in &connectors {
        ctx.block_on(connector.wait_for_stop());
        assert!(!connector.is_started());
    }
    ctx.block_on(acceptor.graceful_stop());
    worker.stop();
}

/// A single failed attempt with no retry surfaces the OS error on an
/// invalid handle and leaves the connector stopped.
#[test]
fn single_attempt_failure_reports_os_error() {
    let mut worker = test_worker("refused");
    let ctx = worker.context().unwrap();

    // Grab an ephemeral port and free it again: nothing listens there.
    let free_addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let connector = TcpConnector::new(&ctx, free_addr);
    let (err_tx, err_rx) = mpsc::channel::<(bool, Error)>();
    assert!(connector.start(
        |_io, _num, _starting| panic!("no session should be created"),
        move |io, err| {
            let _ = err_tx.send((io.is_valid(), err));
        },
    ));
    assert!(!connector.start(|_, _, _| {}, |_, _| {}));

    let (valid, err) = err_rx.recv_timeout(TEST_TIMEOUT).unwrap();
    assert!(!valid);
    assert!(matches!(err, Error::Io(_)), "{err}");

    ctx.block_on(connector.wait_for_stop());
    assert!(!connector.is_started());
    worker.stop();
}

/// With a retry interval configured the connector keeps dialing until a
/// listener appears, then runs a normal session.
#[test]
fn retries_until_listener_appears() {
    let mut worker = test_worker("retry");
    let ctx = worker.context().unwrap();

    let free_addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let connector = TcpConnector::new(&ctx, free_addr).retry_interval(Duration::from_millis(50));
    assert_eq!(connector.remote_addr(), free_addr);

    let count = counter();
    let (err_tx, err_rx) = mpsc::channel::<Error>();
    let count_cb = Arc::clone(&count);
    assert!(connector.start(
        move |io, _num, starting| {
            if starting {
                assert!(tcp_start_io(&io, false, None, Arc::clone(&count_cb)));
            }
        },
        move |_io, err| {
            let _ = err_tx.send(err);
        },
    ));

    // Let a few attempts fail before the listener shows up.
    std::thread::sleep(Duration::from_millis(150));
    let listener = std::net::TcpListener::bind(free_addr).unwrap();
    let (mut sock, _peer) = listener.accept().unwrap();

    use std::io::Write;
    let msg = variable_len_msg(b"made it");
    sock.write_all(&msg).unwrap();
    wait_until(TEST_TIMEOUT, "retried session to deliver", || {
        count.load(Ordering::SeqCst) == 1
    });

    // Peer close ends the session.
    drop(sock);
    let err = err_rx.recv_timeout(TEST_TIMEOUT).unwrap();
    assert!(matches!(err, Error::ConnectionClosed), "{err}");

    ctx.block_on(connector.wait_for_stop());
    assert!(!connector.is_started());
    worker.stop();
}

/// Stopping a connector that is waiting between retry attempts reports
/// cancellation.
#[test]
fn stop_while_retrying_reports_cancelled() {
    let mut worker = test_worker("dial-cancel");
    let ctx = worker.context().unwrap();

    let free_addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let connector = TcpConnector::new(&ctx, free_addr).retry_interval(Duration::from_secs(60));
    let (err_tx, err_rx) = mpsc::channel::<Error>();
    assert!(connector.start(
        |_io, _num, _starting| panic!("no session should be created"),
        move |_io, err| {
            let _ = err_tx.send(err);
        },
    ));

    // First refusal is immediate; the connector is now in its retry wait.
    std::thread::sleep(Duration::from_millis(100));
    assert!(ctx.block_on(connector.graceful_stop()));

    let err = err_rx.recv_timeout(TEST_TIMEOUT).unwrap();
    assert!(err.is_cancelled(), "expected cancellation, got {err}");
    assert!(!connector.is_started());
    worker.stop();
}
