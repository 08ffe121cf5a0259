use clap::Parser;
use log::info;
use std::sync::mpsc;
use std::time::Duration;

use demos::helpers::init_logging;
use netmux::Error;
use netmux_bootstrap::TcpConnector;
use netmux_codec::{encode_with_len_header, VariableFramer};
use netmux_executor::Worker;

#[derive(Parser)]
#[command(name = "Echo Client TCP")]
#[command(version = "0.1.0")]
#[command(about = "Sends framed messages to an echo server and prints the echoes", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("127.0.0.1"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = 10)]
    count: usize,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, &cli.log_level)?;
    let count = cli.count;

    let mut worker = Worker::new("echo-client");
    worker.start();
    let ctx = worker.context().expect("worker started");

    let connector = TcpConnector::new(&ctx, format!("{}:{}", cli.host, cli.port).parse()?)
        .retry_interval(Duration::from_secs(1))
        .max_attempts(5);

    let (done_tx, done_rx) = mpsc::channel::<Option<Error>>();
    let err_tx = done_tx.clone();
    connector.start(
        move |io, _num, starting| {
            if !starting {
                return;
            }
            info!("connected to {:?}", io.socket().ok().map(|s| s.peer_addr()));
            let mut echoed = 0usize;
            let started = io.start_io(Box::new(VariableFramer::big_endian(2)), move |msg, io, _peer| {
                if msg.len() <= 2 {
                    return false;
                }
                echoed += 1;
                println!("echo {}: {}", echoed, String::from_utf8_lossy(&msg[2..]));
                if echoed == count {
                    // end the flow: empty body both ways
                    io.send(encode_with_len_header(b"", 2));
                }
                true
            });
            if started {
                for i in 1..=count {
                    let body = format!("message {i} from the echo client");
                    io.send(encode_with_len_header(body.as_bytes(), 2));
                }
            }
        },
        move |_io, err| {
            let _ = err_tx.send(Some(err));
        },
    );
    drop(done_tx);

    match done_rx.recv() {
        Ok(Some(err)) if !err.is_graceful() => info!("session ended with error: {}", err),
        _ => info!("session complete"),
    }
    ctx.block_on(connector.graceful_stop());
    worker.stop();

    Ok(())
}
