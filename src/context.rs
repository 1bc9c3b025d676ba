//! Per-peer connection state. A `ConnectionContext` is created once the
//! sender's handshake response negotiates the window size and chunk size,
//! and is dropped, releasing the window allocation and the open file, when
//! the state machine reaches `DONE`.

use std::net::SocketAddr;

use tokio::fs::File;

use crate::channel::LossyChannel;
use crate::retry::RetryCounter;
use crate::window::Window;

pub struct ConnectionContext {
    pub channel: LossyChannel,
    pub peer: SocketAddr,
    pub window: Window,
    pub next_seq: u32,
    pub window_size: u16,
    pub buf_size: u16,
    pub file: File,
    pub retry: RetryCounter,
}

impl ConnectionContext {
    pub fn new(
        channel: LossyChannel,
        peer: SocketAddr,
        window_size: u16,
        buf_size: u16,
        file: File,
    ) -> Self {
        ConnectionContext {
            channel,
            peer,
            window: Window::new(window_size as usize),
            next_seq: crate::START_SEQ,
            window_size,
            buf_size,
            file,
            retry: RetryCounter::new(),
        }
    }
}
