//! `rats` — reliable file transfer over UDP.
//!
//! A client asks a server for a file by path; the server streams it back in
//! fixed-size chunks using a Go-Back-N sliding window with cumulative ACKs,
//! checksum-guarded datagrams, and explicit `Done` / `FileNotFound`
//! handshakes.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   DATA (window)   ┌────────────────┐
//!  │ SendSession  │──────────────────▶│ ReceiveSession │
//!  │  SendWindow  │                   │  Reassembler   │
//!  └──────┬───────┘◀──────────────────└───────┬────────┘
//!         │         cumulative ACK            │
//!         │                                   │
//!  ┌──────▼───────────────────────────────────▼───────┐
//!  │                  Link (trait)                    │
//!  │  UdpLink · PeerLink · MemoryLink · Simulator<L>  │
//!  └──────┬───────────────────────────────────────────┘
//!         │ raw UDP datagrams
//!  ┌──────▼────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]       — wire format and checksum
//! - [`send_window`]  — outbound sliding window over a file
//! - [`reassembler`]  — inbound out-of-order buffering and cumulative ACKs
//! - [`sender`]       — server-side session state machine
//! - [`receiver`]     — client-side session state machine
//! - [`server`]       — multi-client event loop and per-peer routing
//! - [`state`]        — session state types and transitions
//! - [`link`]         — datagram link trait and in-memory link
//! - [`socket`]       — async UDP socket and single-peer link
//! - [`simulator`]    — loss / corruption / duplication injection
//! - [`store`]        — path resolution and file access
//! - [`timer`]        — timeouts and retry budgets
//! - [`config`]       — protocol parameters
//! - [`error`]        — session error type

pub mod config;
pub mod error;
pub mod link;
pub mod packet;
pub mod reassembler;
pub mod receiver;
pub mod send_window;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod store;
pub mod timer;

pub use config::ProtocolConfig;
pub use error::TransferError;
pub use receiver::{ReceiveOutcome, ReceiveSession};
pub use sender::{SendOutcome, SendSession};
pub use server::{Server, ServerConfig};
