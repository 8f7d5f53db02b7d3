//! Session state machines.
//!
//! Both ends of a transfer move through a small set of states driven purely
//! by the opcode of the packet at hand.  The sessions in [`crate::sender`]
//! and [`crate::receiver`] own the I/O; this module owns only the transition
//! tables so they can be reasoned about (and tested) in isolation.
//!
//! Sender:
//!
//! ```text
//!  AWAITING_REQUEST ──file opened──▶ SENDING ──window drained──▶ CLOSING
//!        │                             │                           │
//!        │ file missing                │ DONE_ACK / NOT_FOUND_ACK  │ DONE_ACK
//!        ▼                             ▼                           ▼
//!   FILE_MISSING ──NOT_FOUND_ACK──▶ TERMINATED                    DONE
//! ```
//!
//! Receiver:
//!
//! ```text
//!  REQUEST_SENT ──DATA──▶ RECEIVING_DATA ──DONE──▶ FLUSHED_ON_DONE
//!        │                      │
//!        └──── NOT_FOUND ───────┴──────────▶ ABORTED_ON_MISSING
//! ```
//!
//! Any state may fall into `FAILED` when a retry budget runs out; that edge is
//! taken by the session, not by an opcode.

use std::fmt;

use crate::packet::Opcode;

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Waiting for a `FileRequest`.
    #[default]
    AwaitingRequest,
    /// Requested file could not be opened; `FileNotFound` handshake running.
    FileMissing,
    /// Streaming `Data` windows and consuming ACKs.
    Sending,
    /// Every chunk acknowledged; `Done` sent, waiting for `DoneAck`.
    Closing,
    /// Transfer finished.
    Done,
    /// Peer ended the session out of band.
    Terminated,
    /// A retry budget ran out.
    Failed,
}

impl SenderState {
    /// Transition on an inbound packet opcode.
    ///
    /// Opcodes with no edge from the current state leave it unchanged.
    pub fn on_opcode(self, opcode: Opcode) -> Self {
        use Opcode::*;
        match (self, opcode) {
            (Self::Closing, DoneAck) => Self::Done,
            (Self::Sending, DoneAck | FileNotFoundAck) => Self::Terminated,
            (Self::FileMissing, FileNotFoundAck) => Self::Terminated,
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Terminated | Self::Failed)
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingRequest => "AWAITING_REQUEST",
            Self::FileMissing => "FILE_MISSING",
            Self::Sending => "SENDING",
            Self::Closing => "CLOSING",
            Self::Done => "DONE",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// `FileRequest` sent; nothing heard yet.
    #[default]
    RequestSent,
    /// At least one `Data` packet seen.
    ReceivingData,
    /// `Done` received, buffers flushed, `DoneAck` sent.
    FlushedOnDone,
    /// `FileNotFound` received and acknowledged.
    AbortedOnMissing,
    /// A retry budget ran out or the transfer was incomplete.
    Failed,
}

impl ReceiverState {
    pub fn on_opcode(self, opcode: Opcode) -> Self {
        use Opcode::*;
        match (self, opcode) {
            (Self::RequestSent, Data) => Self::ReceivingData,
            (Self::RequestSent | Self::ReceivingData, Done) => Self::FlushedOnDone,
            (Self::RequestSent | Self::ReceivingData, FileNotFound) => Self::AbortedOnMissing,
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::FlushedOnDone | Self::AbortedOnMissing | Self::Failed
        )
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestSent => "REQUEST_SENT",
            Self::ReceivingData => "RECEIVING_DATA",
            Self::FlushedOnDone => "FLUSHED_ON_DONE",
            Self::AbortedOnMissing => "ABORTED_ON_MISSING",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
