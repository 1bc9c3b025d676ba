//! Receiver ("client"/`rcopy`) state machine.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::channel::{LossyChannel, Readiness};
use crate::error::{TransferError, TransferResult};
use crate::frame::{Flag, Frame, DATA_LEN_PREFIX, FRAME_LEN, MAX_DATA_CHUNK, MAX_PAYLOAD};
use crate::retry::{LONG_TIME, MAX_TRIES, SHORT_TIME};

pub struct ReceiverConfig {
    pub server_addr: SocketAddr,
    pub window_size: u16,
    pub buf_size: u16,
    pub remote_filename: String,
    pub local_output: String,
}

enum State {
    Filename,
    FileStatus,
    RecvData,
    Done,
}

fn handshake_frame(window_size: u16, buf_size: u16, filename: &str) -> [u8; FRAME_LEN] {
    let mut payload = [0u8; MAX_PAYLOAD];
    payload[0..2].copy_from_slice(&window_size.to_be_bytes());
    payload[2..4].copy_from_slice(&buf_size.to_be_bytes());
    let name = filename.as_bytes();
    let n = name.len().min(MAX_PAYLOAD - 4);
    payload[4..4 + n].copy_from_slice(&name[..n]);
    Frame::new(1, Flag::Filename, &payload).encode()
}

fn ack_frame(seq: u32, flag: Flag, value: u32) -> [u8; FRAME_LEN] {
    Frame::new(seq, flag, &value.to_be_bytes()).encode()
}

/// Drives the full FILENAME → FILE_STATUS → RECV_DATA → DONE lifecycle.
pub async fn run(channel: LossyChannel, cfg: ReceiverConfig) -> TransferResult<()> {
    channel.set_peer(cfg.server_addr);

    let mut state = State::Filename;
    let mut my_seq: u32 = crate::START_SEQ;
    let mut expected_seq: u32 = crate::START_SEQ;
    let mut output: Option<tokio::fs::File> = None;

    loop {
        state = match state {
            State::Filename => filename_step(&channel, &cfg).await?,
            State::FileStatus => {
                match open_output(&cfg).await? {
                    Some(file) => {
                        output = Some(file);
                        State::RecvData
                    }
                    None => State::Done,
                }
            }
            State::RecvData => {
                let file = output.as_mut().expect("RecvData entered without an open file");
                recv_data_step(&channel, file, &mut my_seq, &mut expected_seq, cfg.buf_size).await?
            }
            State::Done => return Ok(()),
        };
    }
}

async fn filename_step(channel: &LossyChannel, cfg: &ReceiverConfig) -> TransferResult<State> {
    let frame = handshake_frame(cfg.window_size, cfg.buf_size, &cfg.remote_filename);
    let mut tries = 0u32;

    loop {
        channel.send(&frame).await?;

        match channel.wait_readable(SHORT_TIME).await? {
            Readiness::TimedOut => {
                tries += 1;
                if tries > MAX_TRIES {
                    warn!("no response to FILENAME after {} tries, giving up", tries - 1);
                    return Ok(State::Done);
                }
                continue;
            }
            Readiness::Ready => {
                let (bytes, _src) = channel.recv().await?;
                if bytes.len() != FRAME_LEN || !Frame::verify(&bytes) {
                    debug!("corrupt handshake reply, retrying");
                    continue;
                }
                let reply = Frame::decode(&bytes)?;
                return match reply.flag {
                    Flag::FileOk => Ok(State::FileStatus),
                    Flag::FileMissing => {
                        info!(file = %cfg.remote_filename, "remote file missing");
                        Ok(State::Done)
                    }
                    _ => Ok(State::Done),
                };
            }
        }
    }
}

async fn open_output(cfg: &ReceiverConfig) -> TransferResult<Option<tokio::fs::File>> {
    match tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&cfg.local_output)
        .await
    {
        Ok(file) => Ok(Some(file)),
        Err(e) => {
            warn!(error = %e, "could not create output file");
            Ok(None)
        }
    }
}

async fn recv_data_step(
    channel: &LossyChannel,
    file: &mut tokio::fs::File,
    my_seq: &mut u32,
    expected_seq: &mut u32,
    buf_size: u16,
) -> TransferResult<State> {
    if channel.wait_readable(LONG_TIME).await? == Readiness::TimedOut {
        warn!("timeout after {:?}, server must be gone", LONG_TIME);
        return Ok(State::Done);
    }

    let (bytes, _src) = channel.recv().await?;
    if bytes.len() != FRAME_LEN || !Frame::verify(&bytes) {
        debug!("corrupt data frame, dropping");
        return Ok(State::RecvData);
    }

    let frame = match Frame::decode(&bytes) {
        Ok(f) => f,
        Err(TransferError::UnexpectedFlag(_)) => {
            debug!("unrecognized flag, dropping");
            return Ok(State::RecvData);
        }
        Err(e) => return Err(e),
    };

    if frame.flag == Flag::Eof {
        let ack = ack_frame(*my_seq, Flag::EofAck, *expected_seq);
        channel.send(&ack).await?;
        info!("transfer complete");
        return Ok(State::Done);
    }

    let reply;
    if frame.seq == *expected_seq {
        let declared = u16::from_be_bytes([frame.payload[0], frame.payload[1]]) as usize;
        let n = declared.min(buf_size as usize).min(MAX_DATA_CHUNK);
        file.write_all(&frame.payload[DATA_LEN_PREFIX..DATA_LEN_PREFIX + n]).await?;
        *expected_seq += 1;
        reply = ack_frame(*my_seq, Flag::Rr, *expected_seq);
        debug!(seq = frame.seq, "wrote DATA, sent RR");
    } else {
        reply = ack_frame(*my_seq, Flag::Srej, *expected_seq);
        debug!(seq = frame.seq, expected = *expected_seq, "gap, sent SREJ");
    }
    *my_seq += 1;
    channel.send(&reply).await?;

    Ok(State::RecvData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_frame_round_trips_fields() {
        let wire = handshake_frame(7, 900, "remote.bin");
        assert!(Frame::verify(&wire));
        let decoded = Frame::decode(&wire).unwrap();
        assert_eq!(decoded.seq, 1);
        assert_eq!(decoded.flag, Flag::Filename);
        assert_eq!(u16::from_be_bytes([decoded.payload[0], decoded.payload[1]]), 7);
        assert_eq!(u16::from_be_bytes([decoded.payload[2], decoded.payload[3]]), 900);
        assert_eq!(&decoded.payload[4..14], b"remote.bin");
    }
}
