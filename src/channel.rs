//! Thin abstraction over the lossy datagram substrate. `Channel` is a real
//! UDP socket wrapper; `LossyChannel` layers an artificial loss/corruption
//! injector on top of it, standing in for an external fault-injection
//! harness.
//!
//! Sockets are deliberately left OS-unconnected: the sender replies to a new
//! peer from a fresh ephemeral-port socket, so the remembered peer address is
//! just a plain field updated on every `recv`, not a kernel-level `connect`.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;

use crate::error::{TransferError, TransferResult};
use crate::frame::FRAME_LEN;

/// Whether a `wait_readable` call found the socket ready before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// A bound UDP socket with a remembered peer address, learned from whichever
/// address last sent it a datagram (or set explicitly before the first send).
pub struct Channel {
    socket: UdpSocket,
    peer: Mutex<Option<SocketAddr>>,
}

impl Channel {
    pub async fn bind(local: SocketAddr) -> std::io::Result<Self> {
        Ok(Channel {
            socket: UdpSocket::bind(local).await?,
            peer: Mutex::new(None),
        })
    }

    pub fn set_peer(&self, addr: SocketAddr) {
        *self.peer.lock().unwrap() = Some(addr);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends to the remembered peer.
    pub async fn send(&self, frame: &[u8; FRAME_LEN]) -> TransferResult<()> {
        let addr = self
            .peer()
            .ok_or_else(|| TransferError::InvalidArgument("send() with no known peer".into()))?;
        self.socket.send_to(frame, addr).await?;
        Ok(())
    }

    /// Sends to an explicit address, independent of the remembered peer.
    pub async fn send_to(&self, frame: &[u8; FRAME_LEN], addr: SocketAddr) -> std::io::Result<()> {
        self.socket.send_to(frame, addr).await?;
        Ok(())
    }

    /// Blocks until a datagram arrives; remembers its source as the peer.
    pub async fn recv(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; FRAME_LEN];
        let (n, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        self.set_peer(addr);
        Ok((buf, addr))
    }

    /// Single-socket readiness wait with a timeout.
    pub async fn wait_readable(&self, timeout: Duration) -> std::io::Result<Readiness> {
        match tokio::time::timeout(timeout, self.socket.readable()).await {
            Ok(res) => {
                res?;
                Ok(Readiness::Ready)
            }
            Err(_) => Ok(Readiness::TimedOut),
        }
    }
}

/// Wraps a `Channel` with an artificial per-send loss/corruption injector.
/// `error_rate` is the independent probability, in `[0, 1)`, that any given
/// send is dropped; corruption (a single flipped bit) is applied at the same
/// rate to sends that survive the drop check, mirroring the reference
/// harness's drop-or-flip behavior without ever fragmenting a datagram.
pub struct LossyChannel {
    inner: Channel,
    error_rate: f64,
}

impl LossyChannel {
    pub fn new(inner: Channel, error_rate: f64) -> Self {
        LossyChannel { inner, error_rate }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn set_peer(&self, addr: SocketAddr) {
        self.inner.set_peer(addr)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer()
    }

    pub async fn recv(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        self.inner.recv().await
    }

    pub async fn wait_readable(&self, timeout: Duration) -> std::io::Result<Readiness> {
        self.inner.wait_readable(timeout).await
    }

    fn maybe_corrupt(&self, frame: &[u8; FRAME_LEN]) -> Option<[u8; FRAME_LEN]> {
        let mut rng = rand::thread_rng();
        if self.error_rate > 0.0 && rng.gen_bool(self.error_rate) {
            return None; // dropped
        }
        let mut out = *frame;
        if self.error_rate > 0.0 && rng.gen_bool(self.error_rate) {
            let byte = rng.gen_range(0..FRAME_LEN);
            let bit = rng.gen_range(0..8u8);
            out[byte] ^= 1 << bit;
        }
        Some(out)
    }

    pub async fn send(&self, frame: &[u8; FRAME_LEN]) -> TransferResult<()> {
        match self.maybe_corrupt(frame) {
            Some(out) => self.inner.send(&out).await,
            None => Ok(()), // dropped on the floor, as a real lossy link would
        }
    }

    pub async fn send_to(&self, frame: &[u8; FRAME_LEN], addr: SocketAddr) -> std::io::Result<()> {
        match self.maybe_corrupt(frame) {
            Some(out) => self.inner.send_to(&out, addr).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Flag, Frame};

    #[tokio::test]
    async fn lossless_round_trip_over_loopback() {
        let a = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let frame = Frame::new(2, Flag::Data, b"hello").encode();
        a.send_to(&frame, b_addr).await.unwrap();

        let (bytes, _src) = b.recv().await.unwrap();
        assert_eq!(bytes.as_slice(), &frame[..]);
    }

    #[tokio::test]
    async fn recv_updates_remembered_peer() {
        let a = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        let frame = Frame::new(2, Flag::Data, b"hello").encode();
        a.send_to(&frame, b_addr).await.unwrap();
        let (_bytes, src) = b.recv().await.unwrap();
        assert_eq!(src, a_addr);
        assert_eq!(b.peer(), Some(a_addr));
    }

    #[tokio::test]
    async fn wait_readable_times_out_with_nothing_pending() {
        let a = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let readiness = a.wait_readable(Duration::from_millis(20)).await.unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
    }

    #[tokio::test]
    async fn error_rate_zero_never_drops_or_corrupts() {
        let a = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Channel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = b.local_addr().unwrap();
        let lossy = LossyChannel::new(a, 0.0);

        let frame = Frame::new(2, Flag::Data, b"hello").encode();
        for _ in 0..20 {
            lossy.send_to(&frame, b_addr).await.unwrap();
            let (bytes, _) = b.recv().await.unwrap();
            assert!(Frame::verify(&bytes));
        }
    }
}
