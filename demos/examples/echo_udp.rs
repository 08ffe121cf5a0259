use bytes::Bytes;
use clap::Parser;
use log::info;
use std::sync::mpsc;

use demos::helpers::init_logging;
use netmux::UdpStart;
use netmux_bootstrap::UdpEntity;
use netmux_executor::Worker;

#[derive(Parser)]
#[command(name = "Echo UDP")]
#[command(version = "0.1.0")]
#[command(about = "UDP echo: server loops datagrams back, client sends and counts replies", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    /// Run as the echo server instead of the client.
    #[arg(long)]
    server: bool,
    #[arg(long, default_value_t = format!("127.0.0.1"))]
    host: String,
    #[arg(long, default_value_t = 8081)]
    port: u16,
    #[arg(long, default_value_t = 10)]
    count: usize,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

fn run_server(cli: &Cli) -> anyhow::Result<()> {
    let mut worker = Worker::new("udp-echo-server");
    worker.start();
    let ctx = worker.context().expect("worker started");

    let entity = UdpEntity::new(&ctx, Some(format!("{}:{}", cli.host, cli.port).parse()?));
    entity.start(
        |io, _num, starting| {
            if !starting {
                return;
            }
            info!("serving on {:?}", io.socket().ok().map(|s| s.local_addr()));
            io.start_io(UdpStart::receiving(2048, |msg, io, peer| {
                info!("{} bytes from {}", msg.len(), peer);
                io.send_to(msg, peer);
                true
            }));
        },
        |_io, err| info!("udp endpoint ended: {}", err),
    );

    info!("Press Ctrl-C to stop");
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .expect("Error setting Ctrl-C handler");
    let _ = stop_rx.recv();

    ctx.block_on(entity.graceful_stop());
    worker.stop();
    Ok(())
}

fn run_client(cli: &Cli) -> anyhow::Result<()> {
    let mut worker = Worker::new("udp-echo-client");
    worker.start();
    let ctx = worker.context().expect("worker started");

    let remote = format!("{}:{}", cli.host, cli.port).parse()?;
    let count = cli.count;
    let entity = UdpEntity::new(&ctx, None);
    let (done_tx, done_rx) = mpsc::channel::<()>();

    entity.start(
        move |io, _num, starting| {
            if !starting {
                return;
            }
            let done_tx = done_tx.clone();
            let mut replies = 0usize;
            io.start_io(UdpStart::bound(remote, 2048, move |msg, _io, _peer| {
                replies += 1;
                println!("reply {}: {}", replies, String::from_utf8_lossy(&msg));
                if replies == count {
                    let _ = done_tx.send(());
                }
                true
            }));
            for i in 1..=count {
                io.send(Bytes::from(format!("datagram {i}")));
            }
        },
        |_io, err| info!("udp endpoint ended: {}", err),
    );

    let _ = done_rx.recv();
    ctx.block_on(entity.graceful_stop());
    worker.stop();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, &cli.log_level)?;

    if cli.server {
        run_server(&cli)
    } else {
        run_client(&cli)
    }
}
