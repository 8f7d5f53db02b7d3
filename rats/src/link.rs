//! Datagram link abstraction.
//!
//! Sessions never touch a socket directly.  They talk to a [`Link`]: an
//! unreliable, message-oriented pipe to exactly one peer.  Implementations:
//!
//! | Link                               | Used by                          |
//! |------------------------------------|----------------------------------|
//! | [`crate::socket::UdpLink`]         | CLI client, one socket one peer  |
//! | [`crate::server::PeerLink`]        | server, one task per peer        |
//! | [`MemoryLink`]                     | in-process tests                 |
//! | [`crate::simulator::Simulator`]    | fault injection around any link  |
//!
//! A link may lose, duplicate or reorder datagrams; it must not merge or
//! split them.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransferError;
use crate::packet::Packet;

pub trait Link {
    /// Send one datagram.  Loss is silent, as with UDP.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Wait up to `wait` for the next datagram.  `Ok(None)` means the wait
    /// expired.
    fn recv(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransferError>> + Send;
}

/// What a timed receive produced.
#[derive(Debug)]
pub enum Incoming {
    Packet(Packet),
    Timeout,
}

/// Encode and send `packet`.
pub async fn send_packet<L: Link>(link: &mut L, packet: &Packet) -> Result<(), TransferError> {
    let bytes = packet.encode()?;
    link.send(&bytes).await
}

/// Wait up to `wait` for the next packet that decodes cleanly.
///
/// Corrupt or malformed datagrams are logged and dropped without restarting
/// the clock.
pub async fn recv_packet<L: Link>(link: &mut L, wait: Duration) -> Result<Incoming, TransferError> {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(Incoming::Timeout);
        }
        let Some(bytes) = link.recv(remaining).await? else {
            return Ok(Incoming::Timeout);
        };
        match Packet::decode(&bytes) {
            Ok(packet) => return Ok(Incoming::Packet(packet)),
            Err(e) => log::debug!("[link] dropped {}-byte datagram: {e}", bytes.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryLink
// ---------------------------------------------------------------------------

/// One end of an in-process link.  Create both ends with [`memory_pair`].
#[derive(Debug)]
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub fn memory_pair() -> (MemoryLink, MemoryLink) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryLink { tx: a_tx, rx: a_rx },
        MemoryLink { tx: b_tx, rx: b_rx },
    )
}

impl Link for MemoryLink {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), TransferError> {
        // A departed peer looks like a black hole, not an error.
        let _ = self.tx.send(datagram.to_vec());
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransferError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => {
                // Peer dropped: behave like a silent network until the wait ends.
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
