//! Session-level error type.
//!
//! Codec failures live in [`crate::packet::PacketError`]; everything that can
//! end a transfer early is a [`TransferError`].  A missing file is *not* an
//! error: it is reported through the session outcome.

use thiserror::Error;

use crate::packet::PacketError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    /// The retry budget of one phase ran out without a useful response.
    #[error("no response from peer after {attempts} timeouts while {phase}")]
    RetriesExhausted { phase: &'static str, attempts: u32 },
    /// The sender declared the transfer done before every chunk was written.
    #[error("sender finished at chunk {expected} but only {written} chunks were written")]
    Incomplete { expected: u32, written: u32 },
    #[error("file of {0} bytes needs more chunks than a 32-bit sequence can number")]
    FileTooLarge(u64),
    #[error("link closed")]
    LinkClosed,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
