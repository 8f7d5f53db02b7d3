//! Multi-client file server.
//!
//! One UDP socket serves every client.  A single event loop owns the socket's
//! receive side and routes datagrams by source address:
//!
//! ```text
//!                    ┌──────────────────────┐
//!   UDP datagrams ──▶│  Server::run_until   │── FileRequest from new peer ──▶ spawn
//!                    │  (select! loop)      │                                  │
//!                    └──────────┬───────────┘                                  ▼
//!                               │ known peer                         ┌──────────────────┐
//!                               └── mpsc::Sender<Vec<u8>> ──────────▶│ SendSession over │
//!                                                                    │ PeerLink         │
//!                                   Arc<Socket>::send_to ◀───────────┤ (own task)       │
//!                                                                    └──────────────────┘
//! ```
//!
//! Each session runs in its own task with a [`PeerLink`]; finished sessions
//! are reaped from a [`JoinSet`] and their routing entry removed.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinSet};

use crate::config::ProtocolConfig;
use crate::error::TransferError;
use crate::link::Link;
use crate::packet::{Opcode, Packet};
use crate::sender::{SendOutcome, SendSession};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::socket::Socket;

/// Datagrams buffered per session before the router starts dropping them.
const INBOUND_QUEUE: usize = 64;

/// Concurrent sessions allowed by default.
pub const MAX_SESSIONS: usize = 16;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory requested paths are resolved against.
    pub root: PathBuf,
    pub max_sessions: usize,
    pub protocol: ProtocolConfig,
    /// Fault model applied to every session's outbound traffic.
    pub simulator: SimulatorConfig,
}

impl ServerConfig {
    pub fn new(bind: SocketAddr, root: impl Into<PathBuf>) -> Self {
        Self {
            bind,
            root: root.into(),
            max_sessions: MAX_SESSIONS,
            protocol: ProtocolConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// PeerLink
// ---------------------------------------------------------------------------

/// A session's view of the shared server socket.
///
/// Sends go straight out through the socket; receives come from the router.
#[derive(Debug)]
pub struct PeerLink {
    socket: Arc<Socket>,
    peer: SocketAddr,
    inbound: mpsc::Receiver<Vec<u8>>,
}

impl Link for PeerLink {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), TransferError> {
        self.socket.send_to(datagram, self.peer).await
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransferError> {
        match tokio::time::timeout(wait, self.inbound.recv()).await {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => Err(TransferError::LinkClosed),
            Err(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

type SessionResult = (SocketAddr, Result<SendOutcome, TransferError>);

pub struct Server {
    socket: Arc<Socket>,
    config: ServerConfig,
    routes: HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>,
    sessions: JoinSet<SessionResult>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, TransferError> {
        config.protocol.validate()?;
        config.simulator.validate()?;
        if config.max_sessions == 0 {
            return Err(TransferError::InvalidConfig(
                "max sessions must be at least 1".into(),
            ));
        }
        let socket = Socket::bind(config.bind).await?;
        log::info!(
            "[server] listening on {} serving {}",
            socket.local_addr,
            config.root.display()
        );
        Ok(Self {
            socket: Arc::new(socket),
            config,
            routes: HashMap::new(),
            sessions: JoinSet::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve until `shutdown` resolves, then abort every running session.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), TransferError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("[server] shutting down with {} active session(s)", self.routes.len());
                    break;
                }
                received = self.socket.recv_from() => match received {
                    Ok((bytes, from)) => self.dispatch(bytes, from),
                    // e.g. ICMP port-unreachable surfacing on some platforms
                    Err(e) => log::warn!("[server] receive failed: {e}"),
                },
                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    self.reap(joined);
                }
            }
        }
        self.sessions.shutdown().await;
        Ok(())
    }

    fn dispatch(&mut self, bytes: Vec<u8>, from: SocketAddr) {
        if let Some(route) = self.routes.get(&from) {
            match route.try_send(bytes) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::debug!("[server] inbound queue full for {from}; dropping datagram");
                }
                Err(TrySendError::Closed(_)) => {
                    // Session task already gone; its result is still pending.
                    self.routes.remove(&from);
                }
            }
            return;
        }

        let packet = match Packet::decode(&bytes) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("[server] dropped datagram from {from}: {e}");
                return;
            }
        };
        if packet.opcode() != Opcode::FileRequest {
            log::debug!("[server] stray {} from {from}", packet.opcode());
            return;
        }
        if self.routes.len() >= self.config.max_sessions {
            log::warn!("[server] {} sessions active; ignoring request from {from}", self.routes.len());
            return;
        }

        let requested = String::from_utf8_lossy(&packet.payload).into_owned();
        log::info!("[server] {from} requests {requested:?}");

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let link = PeerLink {
            socket: Arc::clone(&self.socket),
            peer: from,
            inbound: rx,
        };
        let link = match Simulator::new(link, self.config.simulator.clone()) {
            Ok(link) => link,
            Err(e) => {
                log::error!("[server] cannot start session for {from}: {e}");
                return;
            }
        };
        self.routes.insert(from, tx);

        let root = self.config.root.clone();
        let protocol = self.config.protocol;
        self.sessions.spawn(async move {
            let mut session = SendSession::new(link, protocol);
            let outcome = session.serve(&root, &requested).await;
            (from, outcome)
        });
    }

    fn reap(&mut self, joined: Result<SessionResult, JoinError>) {
        let (peer, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                log::error!("[server] session task failed: {e}");
                return;
            }
        };
        self.routes.remove(&peer);
        match outcome {
            Ok(SendOutcome::Delivered {
                chunks,
                bytes,
                confirmed,
            }) => log::info!(
                "[server] {peer}: delivered {bytes} bytes in {chunks} chunk(s){}",
                if confirmed { "" } else { " (unconfirmed)" }
            ),
            Ok(SendOutcome::FileMissing { acknowledged }) => {
                log::info!("[server] {peer}: file not found (acknowledged: {acknowledged})")
            }
            Ok(SendOutcome::Terminated) => log::info!("[server] {peer}: terminated by client"),
            Err(e) => log::warn!("[server] {peer}: transfer failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{recv_packet, send_packet, Incoming};

    #[tokio::test]
    async fn peer_link_reports_closed_router() {
        let socket = Arc::new(Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
        let (tx, rx) = mpsc::channel(1);
        let mut link = PeerLink {
            socket,
            peer: "127.0.0.1:9".parse().unwrap(),
            inbound: rx,
        };
        tx.send(b"queued".to_vec()).await.unwrap();
        drop(tx);
        assert_eq!(
            link.recv(Duration::from_millis(10)).await.unwrap().as_deref(),
            Some(&b"queued"[..])
        );
        assert!(matches!(
            link.recv(Duration::from_millis(10)).await,
            Err(TransferError::LinkClosed)
        ));
    }

    #[tokio::test]
    async fn zero_sessions_rejected() {
        let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), ".");
        config.max_sessions = 0;
        assert!(matches!(
            Server::bind(config).await,
            Err(TransferError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn stray_packets_do_not_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), dir.path());
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let client = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut link = crate::socket::UdpLink::new(client, addr);
        send_packet(&mut link, &Packet::ack(4)).await.unwrap();
        assert!(matches!(
            recv_packet(&mut link, Duration::from_millis(100)).await.unwrap(),
            Incoming::Timeout
        ));

        let _ = stop_tx.send(());
        handle.await.unwrap().unwrap();
    }
}
