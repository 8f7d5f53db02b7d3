//! Receive-side reassembly.
//!
//! [`Reassembler`] accepts `Data` chunks in any order, buffers the ones that
//! arrive early, and releases them strictly in sequence:
//!
//! - A chunk is stored only the first time its sequence number is seen;
//!   duplicates are discarded.
//! - Zero-length payloads are never stored (and never marked seen).
//! - [`Reassembler::ack_value`] is the smallest sequence number at or after
//!   the write cursor that has not been seen, i.e. the cumulative ACK.
//!
//! This module only manages state; the session does the socket I/O.

use std::collections::{BTreeMap, BTreeSet};

use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Default)]
pub struct Reassembler {
    /// Chunks received but not yet written, keyed by sequence number.
    pending: BTreeMap<u32, Vec<u8>>,
    /// Every sequence number ever accepted.
    seen: BTreeSet<u32>,
    /// Sequence number of the next chunk to write.
    write_cursor: u32,
    bytes_written: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a received chunk.  Returns `true` if it was stored.
    pub fn accept(&mut self, seq: u32, payload: &[u8]) -> bool {
        if payload.is_empty() || seq < self.write_cursor {
            return false;
        }
        if !self.seen.insert(seq) {
            return false;
        }
        self.pending.insert(seq, payload.to_vec());
        true
    }

    /// Remove and return the contiguous run of chunks starting at the cursor.
    pub fn take_contiguous(&mut self) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.write_cursor {
                break;
            }
            ready.push(entry.remove());
            self.write_cursor += 1;
        }
        ready
    }

    /// Write every contiguous chunk to `out`; returns how many were written.
    pub async fn flush_to<W: AsyncWrite + Unpin>(
        &mut self,
        out: &mut W,
    ) -> std::io::Result<usize> {
        let ready = self.take_contiguous();
        for chunk in &ready {
            out.write_all(chunk).await?;
            self.bytes_written += chunk.len() as u64;
        }
        if !ready.is_empty() {
            out.flush().await?;
        }
        Ok(ready.len())
    }

    /// Cumulative ACK value: first sequence `>= write_cursor` not yet seen.
    pub fn ack_value(&self) -> u32 {
        let mut next = self.write_cursor;
        for &seq in self.seen.range(self.write_cursor..) {
            if seq != next {
                break;
            }
            match next.checked_add(1) {
                Some(n) => next = n,
                None => break,
            }
        }
        next
    }

    pub fn write_cursor(&self) -> u32 {
        self.write_cursor
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Chunks held back waiting for a gap to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
