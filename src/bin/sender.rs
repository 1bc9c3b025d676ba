//! File-transfer server: accepts FILENAME handshakes from any number of
//! peers and spawns one task per connection (replacing the reference
//! implementation's per-client `fork()`).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use clap::Parser;
use relxfer::channel::Channel;
use relxfer::error::{TransferError, TransferResult};
use relxfer::sender;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Reliable file-transfer sender.
#[derive(Parser, Debug)]
struct Args {
    /// Artificial per-send loss/corruption rate, in [0, 1).
    error_rate: f64,

    /// Port to listen on; 0 lets the OS pick an ephemeral port.
    #[arg(default_value_t = 0)]
    port: u16,
}

fn validate_error_rate(rate: f64) -> TransferResult<()> {
    if !(0.0..1.0).contains(&rate) {
        return Err(TransferError::InvalidArgument(format!(
            "error rate needs to be between 0 and less than 1 and is {rate}"
        )));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(e) = validate_error_rate(args.error_rate) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!(error = %e, "fatal error");
        std::process::exit(2);
    }
}

async fn run(args: Args) -> TransferResult<()> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse().unwrap();
    let listener = Channel::bind(listen_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let in_flight: Arc<Mutex<HashSet<SocketAddr>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut tasks = JoinSet::new();

    loop {
        // Reap finished connections opportunistically.
        while tasks.try_join_next().is_some() {}

        let (peer, handshake) = sender::recv_handshake(&listener).await?;
        if !in_flight.lock().unwrap().insert(peer) {
            continue; // duplicate handshake for a connection already in progress
        }

        let error_rate = args.error_rate;
        let in_flight = in_flight.clone();

        tasks.spawn(async move {
            let result = sender::serve_connection(peer, handshake, error_rate).await;
            if let Err(e) = &result {
                error!(%peer, error = %e, "connection failed");
            }
            in_flight.lock().unwrap().remove(&peer);
        });
    }
}
