//! The spec's "client" (`rcopy`): requests one remote file over a lossy
//! channel and writes it to a local path.

use clap::Parser;
use relxfer::channel::{Channel, LossyChannel};
use relxfer::error::{TransferError, TransferResult};
use relxfer::receiver::{self, ReceiverConfig};
use tracing::error;

/// Reliable file-transfer receiver.
#[derive(Parser, Debug)]
struct Args {
    /// Path to write the transferred file to, locally.
    local_output: String,
    /// Path of the file to request from the remote sender.
    remote_input: String,
    /// Sender-side retransmission window size.
    window_size: u16,
    /// Chunk size read from the source file per DATA frame (<= 1400).
    buffer_size: u16,
    /// Artificial per-send loss/corruption rate, in [0, 1).
    error_rate: f64,
    /// Remote sender host name or address.
    remote_host: String,
    /// Remote sender port.
    remote_port: u16,
}

fn validate(args: &Args) -> TransferResult<()> {
    if !(0.0..1.0).contains(&args.error_rate) {
        return Err(TransferError::InvalidArgument(format!(
            "error rate needs to be between 0 and less than 1 and is {}",
            args.error_rate
        )));
    }
    if args.remote_input.len() > 100 {
        return Err(TransferError::InvalidArgument(
            "file name is too long, must be <= 100 chars".into(),
        ));
    }
    if args.buffer_size == 0 || args.buffer_size as usize > relxfer::frame::MAX_DATA_CHUNK {
        return Err(TransferError::InvalidArgument(format!(
            "buffer size must be in 1..={}",
            relxfer::frame::MAX_DATA_CHUNK
        )));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(e) = validate(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!(error = %e, "fatal error");
        std::process::exit(2);
    }
}

async fn run(args: Args) -> TransferResult<()> {
    let server_addr = tokio::net::lookup_host((args.remote_host.as_str(), args.remote_port))
        .await?
        .next()
        .ok_or_else(|| TransferError::InvalidArgument(format!("could not resolve {}", args.remote_host)))?;

    let channel = Channel::bind("0.0.0.0:0".parse().unwrap()).await?;
    let lossy = LossyChannel::new(channel, args.error_rate);

    let cfg = ReceiverConfig {
        server_addr,
        window_size: args.window_size,
        buf_size: args.buffer_size,
        remote_filename: args.remote_input,
        local_output: args.local_output,
    };

    receiver::run(lossy, cfg).await
}
