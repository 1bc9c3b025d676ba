//! Sender ("server") state machine. One `ConnectionContext` is driven to
//! completion per accepted peer; the binary entry point spawns one `run`
//! per new peer address instead of forking a child process.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::channel::{Channel, LossyChannel, Readiness};
use crate::context::ConnectionContext;
use crate::error::TransferResult;
use crate::frame::{Flag, Frame, DATA_LEN_PREFIX, FRAME_LEN, MAX_DATA_CHUNK, MAX_PAYLOAD};
use crate::retry::SHORT_TIME;

enum DataState {
    SendData,
    WindowClosed,
    RecvAck,
    Done,
}

/// Decoded FILENAME handshake payload.
pub struct Handshake {
    pub window_size: u16,
    pub buf_size: u16,
    pub filename: String,
}

impl Handshake {
    pub fn decode(payload: &[u8; MAX_PAYLOAD]) -> Self {
        let window_size = u16::from_be_bytes([payload[0], payload[1]]);
        let buf_size = u16::from_be_bytes([payload[2], payload[3]]);
        let name_bytes = &payload[4..];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let filename = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
        Handshake {
            window_size,
            buf_size,
            filename,
        }
    }
}

/// Blocks on the listening socket until a well-formed FILENAME frame arrives,
/// skipping corrupt or otherwise-flagged datagrams. Returns the peer address
/// and decoded handshake so the caller can spawn a fresh per-connection
/// socket for it.
pub async fn recv_handshake(listener: &Channel) -> TransferResult<(SocketAddr, Handshake)> {
    loop {
        let (bytes, peer) = listener.recv().await?;
        if !Frame::verify(&bytes) {
            warn!(%peer, "corrupt packet, dropping");
            continue;
        }
        let Ok(frame) = Frame::decode(&bytes) else {
            continue;
        };
        if frame.flag != Flag::Filename {
            continue;
        }
        return Ok((peer, Handshake::decode(&frame.payload)));
    }
}

/// Binds a fresh ephemeral-port socket for one accepted peer and drives it
/// through `run` to completion.
pub async fn serve_connection(peer: SocketAddr, handshake: Handshake, error_rate: f64) -> TransferResult<()> {
    let channel = Channel::bind("0.0.0.0:0".parse().unwrap()).await?;
    let lossy = LossyChannel::new(channel, error_rate);
    run(lossy, peer, &handshake).await
}

/// `SETUP_WAIT`: responds to a freshly accepted peer's handshake frame, then
/// runs the data phase to completion (or `DONE` via `FILE_MISSING`).
pub async fn run(channel: LossyChannel, peer: SocketAddr, handshake: &Handshake) -> TransferResult<()> {
    channel.set_peer(peer);

    let file = match tokio::fs::File::open(&handshake.filename).await {
        Ok(f) => f,
        Err(_) => {
            info!(file = %handshake.filename, "file missing, sending FILE_MISSING");
            let reply = Frame::new(1, Flag::FileMissing, &[]).encode();
            channel.send(&reply).await?;
            return Ok(());
        }
    };

    info!(file = %handshake.filename, window = handshake.window_size, buf = handshake.buf_size, "file ok, beginning transfer");
    let reply = Frame::new(1, Flag::FileOk, &[]).encode();
    channel.send(&reply).await?;

    let mut ctx = ConnectionContext::new(channel, peer, handshake.window_size, handshake.buf_size, file);
    let result = run_data_phase(&mut ctx).await;
    info!(peer = %ctx.peer, "connection finished");
    result
}

async fn run_data_phase(ctx: &mut ConnectionContext) -> TransferResult<()> {
    let mut state = DataState::SendData;
    loop {
        state = match state {
            DataState::SendData => send_data_step(ctx).await?,
            DataState::WindowClosed => window_closed_step(ctx).await?,
            DataState::RecvAck => recv_ack_step(ctx).await?,
            DataState::Done => return Ok(()),
        };
    }
}

async fn poll_readable(ctx: &ConnectionContext) -> TransferResult<bool> {
    Ok(ctx.channel.wait_readable(Duration::ZERO).await? == Readiness::Ready)
}

async fn send_data_step(ctx: &mut ConnectionContext) -> TransferResult<DataState> {
    if poll_readable(ctx).await? {
        return Ok(DataState::RecvAck);
    }

    if ctx.window.count() == ctx.window_size as usize {
        return Ok(DataState::WindowClosed);
    }

    let chunk_size = (ctx.buf_size as usize).min(MAX_DATA_CHUNK);
    let mut buf = vec![0u8; chunk_size];
    let n = ctx.file.read(&mut buf).await?;

    if n == 0 {
        debug!(seq = ctx.next_seq, "EOF reached, sending EOF frame");
        let frame = Frame::new(ctx.next_seq, Flag::Eof, &[]);
        let wire = frame.encode();
        ctx.window.save(ctx.next_seq, wire);
        ctx.channel.send(&wire).await?;
        return Ok(DataState::WindowClosed);
    }

    let mut data = Vec::with_capacity(DATA_LEN_PREFIX + n);
    data.extend_from_slice(&(n as u16).to_be_bytes());
    data.extend_from_slice(&buf[..n]);
    let frame = Frame::new(ctx.next_seq, Flag::Data, &data);
    let wire = frame.encode();
    ctx.window.save(ctx.next_seq, wire);
    ctx.channel.send(&wire).await?;
    debug!(seq = ctx.next_seq, len = n, "sent DATA");
    ctx.next_seq += 1;

    if poll_readable(ctx).await? {
        return Ok(DataState::RecvAck);
    }
    Ok(DataState::SendData)
}

async fn window_closed_step(ctx: &mut ConnectionContext) -> TransferResult<DataState> {
    if ctx.window.count() == 0 {
        return Ok(DataState::SendData);
    }

    match ctx.channel.wait_readable(SHORT_TIME).await? {
        Readiness::Ready => {
            ctx.retry.reset();
            Ok(DataState::RecvAck)
        }
        Readiness::TimedOut => {
            if ctx.retry.tick() {
                warn!("data resent {} times, other side is down", ctx.retry.tries());
                return Ok(DataState::Done);
            }
            retransmit_window(ctx).await
        }
    }
}

/// Retransmits the window in ascending-seq order, abandoning the burst early
/// if an ack becomes available mid-way through.
async fn retransmit_window(ctx: &mut ConnectionContext) -> TransferResult<DataState> {
    let mut scratch = ctx.window.clone();
    loop {
        let Some((seq, wire)) = scratch.lowest_unacked() else {
            break;
        };
        ctx.channel.send(&wire).await?;
        debug!(seq, "retransmitted");
        scratch.delete_le(seq);

        if poll_readable(ctx).await? {
            return Ok(DataState::RecvAck);
        }
    }
    Ok(DataState::WindowClosed)
}

async fn recv_ack_step(ctx: &mut ConnectionContext) -> TransferResult<DataState> {
    let (bytes, _src) = ctx.channel.recv().await?;
    if bytes.len() != FRAME_LEN || !Frame::verify(&bytes) {
        debug!("corrupt ack, ignoring");
        return Ok(DataState::WindowClosed);
    }

    let Ok(frame) = Frame::decode(&bytes) else {
        return Ok(DataState::Done);
    };

    match frame.flag {
        Flag::Rr => {
            let n = u32::from_be_bytes(frame.payload[0..4].try_into().unwrap());
            ctx.window.delete_le(n - 1);
            Ok(DataState::SendData)
        }
        Flag::Srej => {
            let s = u32::from_be_bytes(frame.payload[0..4].try_into().unwrap());
            ctx.window.delete_le(s - 1);
            Ok(DataState::WindowClosed)
        }
        Flag::EofAck => Ok(DataState::Done),
        _ => Ok(DataState::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_handshake_payload() {
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[0..2].copy_from_slice(&5u16.to_be_bytes());
        payload[2..4].copy_from_slice(&512u16.to_be_bytes());
        payload[4..9].copy_from_slice(b"a.txt");
        let hs = Handshake::decode(&payload);
        assert_eq!(hs.window_size, 5);
        assert_eq!(hs.buf_size, 512);
        assert_eq!(hs.filename, "a.txt");
    }
}
