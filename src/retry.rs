//! Timeout and retry ceilings shared by both state machines.

use std::time::Duration;

/// Per-ack wait on the sender, and per-handshake-retry wait on the receiver.
pub const SHORT_TIME: Duration = Duration::from_secs(1);

/// Per-data wait on the receiver before declaring the sender gone.
pub const LONG_TIME: Duration = Duration::from_secs(10);

/// Ceiling on unanswered handshake attempts (receiver) and consecutive
/// short-timeout expirations without a new ack (sender).
pub const MAX_TRIES: u32 = 10;

/// A simple exhaustible counter: increments on timeout, resets on progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryCounter {
    tries: u32,
}

impl RetryCounter {
    pub fn new() -> Self {
        RetryCounter { tries: 0 }
    }

    pub fn reset(&mut self) {
        self.tries = 0;
    }

    /// Records a timeout; returns `true` if the ceiling has now been exceeded.
    pub fn tick(&mut self) -> bool {
        self.tries += 1;
        self.tries > MAX_TRIES
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }
}
