//! Async UDP socket and the point-to-point link built on it.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that owns only
//! byte I/O.  [`UdpLink`] pins a socket to one peer and implements
//! [`crate::link::Link`] for the client side of a transfer.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error::TransferError;
use crate::link::Link;
use crate::packet::MAX_DATAGRAM;

/// Receive buffer size.  Larger than any valid datagram so oversized ones are
/// seen whole and rejected by the codec instead of being silently truncated.
const RECV_BUFFER: usize = 2 * MAX_DATAGRAM;

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransferError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    pub async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransferError> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    /// Receive the next datagram.  Returns `(bytes, sender_address)`.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransferError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

// ---------------------------------------------------------------------------
// UdpLink
// ---------------------------------------------------------------------------

/// A socket dedicated to a single peer.
///
/// Datagrams from any other address are discarded.
#[derive(Debug)]
pub struct UdpLink {
    socket: Socket,
    peer: SocketAddr,
}

impl UdpLink {
    pub fn new(socket: Socket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }
}

impl Link for UdpLink {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), TransferError> {
        self.socket.send_to(datagram, self.peer).await
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransferError> {
        let deadline = Instant::now() + wait;
        loop {
            let received = tokio::time::timeout_at(deadline, self.socket.recv_from()).await;
            let Ok(result) = received else {
                return Ok(None);
            };
            let (bytes, from) = match result {
                Ok(received) => received,
                // e.g. ICMP port-unreachable reported as ECONNRESET
                Err(e) => {
                    log::debug!("[udp] receive failed, still waiting: {e}");
                    continue;
                }
            };
            if from == self.peer {
                return Ok(Some(bytes));
            }
            log::debug!("[udp] ignoring {} bytes from stranger {from}", bytes.len());
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
