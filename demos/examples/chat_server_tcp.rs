use clap::Parser;
use log::info;
use std::sync::mpsc;
use std::sync::Arc;

use demos::helpers::init_logging;
use netmux::TcpIo;
use netmux_bootstrap::{SendToAll, TcpAcceptor};
use netmux_codec::DelimiterFramer;
use netmux_executor::Worker;

#[derive(Parser)]
#[command(name = "Chat Server TCP")]
#[command(version = "0.1.0")]
#[command(about = "Relays LF-framed lines to every connected peer", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("0.0.0.0"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, &cli.log_level)?;

    let mut worker = Worker::new("chat-server");
    worker.start();
    let ctx = worker.context().expect("worker started");

    let acceptor = TcpAcceptor::new(&ctx, format!("{}:{}", cli.host, cli.port).parse()?, true)?;
    info!("listening on {}", acceptor.local_addr());
    info!("try `nc {} {}` in another shell", cli.host, cli.port);
    info!("Press Ctrl-C to stop");

    // Every live connection's handle, for the broadcast relay.
    let peers: Arc<SendToAll<TcpIo>> = Arc::new(SendToAll::new());

    let peers_cb = Arc::clone(&peers);
    acceptor.start(
        move |io, num, starting| {
            if !starting {
                info!("a peer left, {} in the room", num);
                peers_cb.remove(&io);
                return;
            }
            info!("a peer joined, {} in the room", num);
            let relay = Arc::clone(&peers_cb);
            io.start_io(Box::new(DelimiterFramer::lf()), move |msg, _io, peer| {
                if msg.len() <= 1 {
                    return false; // bare newline leaves the room
                }
                info!("{} says: {}", peer, String::from_utf8_lossy(&msg[..msg.len() - 1]));
                relay.send(msg);
                true
            });
            peers_cb.add(io);
        },
        |_io, err| {
            info!("connection ended: {}", err);
        },
    );

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .expect("Error setting Ctrl-C handler");
    let _ = stop_rx.recv();

    info!("Wait for Gracefully Shutdown...");
    ctx.block_on(acceptor.graceful_stop());
    worker.stop();
    info!("Server is Gracefully Shutdown Completed");

    Ok(())
}
