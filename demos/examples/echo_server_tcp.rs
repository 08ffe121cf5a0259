use clap::Parser;
use log::{error, info};
use std::sync::mpsc;

use demos::helpers::init_logging;
use netmux_bootstrap::TcpAcceptor;
use netmux_codec::VariableFramer;
use netmux_executor::Worker;

#[derive(Parser)]
#[command(name = "Echo Server TCP")]
#[command(version = "0.1.0")]
#[command(about = "Echoes variable-length framed messages back to each peer", long_about = None)]
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

    let mut worker = Worker::new("echo-server");
    worker.start();
    let ctx = worker.context().expect("worker started");

    let acceptor = TcpAcceptor::new(&ctx, format!("{}:{}", cli.host, cli.port).parse()?, true)?;
    info!("listening on {}", acceptor.local_addr());
    info!("Press Ctrl-C to stop");

    acceptor.start(
        |io, num, starting| {
            if !starting {
                info!("peer left, {} remaining", num);
                return;
            }
            info!("peer joined, {} active", num);
            io.start_io(Box::new(VariableFramer::big_endian(2)), |msg, io, peer| {
                if msg.len() <= 2 {
                    info!("end of flow from {}", peer);
                    return false;
                }
                io.send(msg);
                true
            });
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
    if !ctx.block_on(acceptor.graceful_stop()) {
        error!("acceptor was already stopped");
    }
    worker.stop();
    info!("Server is Gracefully Shutdown Completed");

    Ok(())
}
