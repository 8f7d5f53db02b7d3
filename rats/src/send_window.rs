//! Sliding send window over a file.
//!
//! [`SendWindow`] slices a byte source into fixed-size chunks numbered
//! `0..total_chunks` and keeps at most `window_size` of them buffered for
//! (re)transmission.
//!
//! # Protocol contract
//!
//! - ACKs are **cumulative**: `Ack(next)` means every chunk `< next` arrived.
//! - On timeout the caller retransmits **every** buffered chunk.
//! - `window_start` never decreases.
//! - An ACK at or below `window_start` is a duplicate; one beyond
//!   `window_end + 1` cannot have been produced by an honest receiver and is
//!   ignored as well.
//!
//! ```text
//!   window_start            window_end        max_sequence
//!        │                      │                  │
//!  ──────┼──────────────────────┼──────────────────┼──▶ chunk index
//!  acked │ <──── buffered ────▶ │ <── unread ────▶ │
//! ```
//!
//! This module only manages state and file reads; all socket I/O is the
//! caller's responsibility.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TransferError;
use crate::packet::Packet;

/// Result of feeding an ACK value to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window slid forward by this many chunks.
    Advanced(u32),
    /// `next <= window_start`; nothing new acknowledged.
    Duplicate,
    /// `next` lies past the end of the window.
    OutOfRange,
}

/// Number of chunks a file of `file_size` bytes is cut into.
pub fn chunk_count(file_size: u64, chunk_size: usize) -> Result<u32, TransferError> {
    let chunk = chunk_size as u64;
    let count = file_size.div_ceil(chunk);
    u32::try_from(count).map_err(|_| TransferError::FileTooLarge(file_size))
}

#[derive(Debug)]
pub struct SendWindow<R> {
    source: R,
    file_size: u64,
    chunk_size: usize,
    window_size: u32,
    total_chunks: u32,

    /// Oldest unacknowledged chunk (left window edge).
    window_start: u32,
    /// Next chunk to be read from `source`.
    next_read: u32,
    /// Payloads of chunks `window_start..next_read`, front = oldest.
    buffered: VecDeque<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> SendWindow<R> {
    /// Create a window over `source` and load the first batch of chunks.
    ///
    /// `file_size` must be the exact number of bytes `source` yields.
    pub async fn open(
        source: R,
        file_size: u64,
        window_size: u32,
        chunk_size: usize,
    ) -> Result<Self, TransferError> {
        if window_size == 0 || chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "window and chunk size must be non-zero".into(),
            ));
        }
        let total_chunks = chunk_count(file_size, chunk_size)?;
        let mut window = Self {
            source,
            file_size,
            chunk_size,
            window_size,
            total_chunks,
            window_start: 0,
            next_read: 0,
            buffered: VecDeque::with_capacity(window_size.min(total_chunks) as usize),
        };
        window.fill().await?;
        Ok(window)
    }

    pub fn window_start(&self) -> u32 {
        self.window_start
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Index of the last chunk; `-1` for an empty file.
    pub fn max_sequence(&self) -> i64 {
        i64::from(self.total_chunks) - 1
    }

    /// Index of the last chunk currently inside the window.
    pub fn window_end(&self) -> i64 {
        let end = i64::from(self.window_start) + i64::from(self.window_size) - 1;
        end.min(self.max_sequence())
    }

    /// Every chunk has been acknowledged.
    pub fn is_complete(&self) -> bool {
        i64::from(self.window_start) > self.max_sequence()
    }

    pub fn in_flight(&self) -> usize {
        self.buffered.len()
    }

    /// `Data` packets for every chunk in the window, oldest first.
    pub fn data_packets(&self) -> impl Iterator<Item = Packet> + '_ {
        self.buffered
            .iter()
            .zip(self.window_start..)
            .map(|(chunk, seq)| Packet::data(seq, chunk.clone()))
    }

    /// Process a cumulative ACK, sliding the window and reading new chunks.
    pub async fn on_ack(&mut self, next: u32) -> Result<AckOutcome, TransferError> {
        if next <= self.window_start {
            return Ok(AckOutcome::Duplicate);
        }
        if i64::from(next) > self.window_end() + 1 {
            return Ok(AckOutcome::OutOfRange);
        }

        let advanced = next - self.window_start;
        self.buffered.drain(..advanced as usize);
        self.window_start = next;
        self.fill().await?;
        Ok(AckOutcome::Advanced(advanced))
    }

    /// Read chunks until the buffer covers `window_start..=window_end`.
    async fn fill(&mut self) -> Result<(), TransferError> {
        let end = self.window_end();
        while i64::from(self.next_read) <= end {
            let offset = u64::from(self.next_read) * self.chunk_size as u64;
            let len = (self.file_size - offset).min(self.chunk_size as u64) as usize;
            let mut chunk = vec![0u8; len];
            self.source.read_exact(&mut chunk).await?;
            self.buffered.push_back(chunk);
            self.next_read += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 1015).unwrap(), 0);
        assert_eq!(chunk_count(1, 1015).unwrap(), 1);
        assert_eq!(chunk_count(1015, 1015).unwrap(), 1);
        assert_eq!(chunk_count(1016, 1015).unwrap(), 2);
        assert_eq!(chunk_count(3000, 1015).unwrap(), 3);
    }

    #[test]
    fn chunk_count_overflow() {
        let err = chunk_count(u64::MAX, 1).unwrap_err();
        assert!(matches!(err, TransferError::FileTooLarge(_)));
    }

    #[tokio::test]
    async fn empty_file_is_complete_at_once() {
        let w = SendWindow::open(&b""[..], 0, 5, 1015).await.unwrap();
        assert_eq!(w.max_sequence(), -1);
        assert!(w.is_complete());
        assert_eq!(w.data_packets().count(), 0);
    }

    #[tokio::test]
    async fn three_thousand_bytes_make_three_chunks() {
        let data = bytes(3000);
        let w = SendWindow::open(&data[..], 3000, 5, 1015).await.unwrap();
        assert_eq!(w.total_chunks(), 3);
        assert_eq!(w.window_end(), 2);

        let pkts: Vec<Packet> = w.data_packets().collect();
        let sizes: Vec<usize> = pkts.iter().map(|p| p.payload.len()).collect();
        assert_eq!(sizes, vec![1015, 1015, 970]);
        let seqs: Vec<u32> = pkts.iter().map(|p| p.seq()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(&pkts[2].payload[..], &data[2030..]);
    }

    #[tokio::test]
    async fn window_caps_buffered_chunks() {
        let data = bytes(100);
        let w = SendWindow::open(&data[..], 100, 5, 10).await.unwrap();
        assert_eq!(w.in_flight(), 5);
        assert_eq!(w.window_end(), 4);
        assert_eq!(w.max_sequence(), 9);
    }

    #[tokio::test]
    async fn huge_window_buffers_only_existing_chunks() {
        let w = SendWindow::open(&[1u8; 10][..], 10, u32::MAX, 1015).await.unwrap();
        assert_eq!(w.total_chunks(), 1);
        assert_eq!(w.in_flight(), 1);
        assert_eq!(w.window_end(), 0);
    }

    #[tokio::test]
    async fn ack_slides_and_refills() {
        let data = bytes(100);
        let mut w = SendWindow::open(&data[..], 100, 5, 10).await.unwrap();

        assert_eq!(w.on_ack(3).await.unwrap(), AckOutcome::Advanced(3));
        assert_eq!(w.window_start(), 3);
        assert_eq!(w.window_end(), 7);
        assert_eq!(w.in_flight(), 5);
        let first = w.data_packets().next().unwrap();
        assert_eq!(first.seq(), 3);
        assert_eq!(first.payload, &data[30..40]);
    }

    #[tokio::test]
    async fn duplicate_and_out_of_range_acks_ignored() {
        let data = bytes(100);
        let mut w = SendWindow::open(&data[..], 100, 5, 10).await.unwrap();
        w.on_ack(2).await.unwrap();

        assert_eq!(w.on_ack(2).await.unwrap(), AckOutcome::Duplicate);
        assert_eq!(w.on_ack(0).await.unwrap(), AckOutcome::Duplicate);
        // window is 2..=6, so the largest sensible ACK is 7.
        assert_eq!(w.on_ack(8).await.unwrap(), AckOutcome::OutOfRange);
        assert_eq!(w.window_start(), 2);
        assert_eq!(w.on_ack(7).await.unwrap(), AckOutcome::Advanced(5));
    }

    #[tokio::test]
    async fn final_ack_completes() {
        let data = bytes(25);
        let mut w = SendWindow::open(&data[..], 25, 5, 10).await.unwrap();
        assert_eq!(w.window_end(), 2);
        assert_eq!(w.on_ack(3).await.unwrap(), AckOutcome::Advanced(3));
        assert!(w.is_complete());
        assert_eq!(w.in_flight(), 0);
    }

    #[tokio::test]
    async fn short_source_is_an_io_error() {
        let data = bytes(5);
        let err = SendWindow::open(&data[..], 50, 5, 10).await.unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
