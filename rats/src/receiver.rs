//! Receiving side of a transfer (the client).
//!
//! [`ReceiveSession`] sends a `FileRequest` and then works in **batches**:
//! it collects up to `window_size` datagrams, where the first wait of a batch
//! uses the phase timeout and later waits use the short batch linger.  After
//! each batch it writes whatever is now contiguous and answers with one
//! cumulative `Ack(next_expected)`.
//!
//! Control packets end the session immediately:
//! - `FileNotFound` → reply `FileNotFoundAck`, outcome [`ReceiveOutcome::NotFound`].
//! - `Done(n)` → flush, reply `DoneAck`, outcome [`ReceiveOutcome::Complete`]
//!   provided all `n` chunks were written.
//!
//! The request itself is resent exactly once if nothing at all comes back.
//! After that, consecutive empty batches are bounded by the retry budget.

use std::path::Path;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::ProtocolConfig;
use crate::error::TransferError;
use crate::link::{recv_packet, send_packet, Incoming, Link};
use crate::packet::{Opcode, Packet};
use crate::reassembler::Reassembler;
use crate::state::ReceiverState;
use crate::store;
use crate::timer::RetryBudget;

/// How a receive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Complete { chunks: u32, bytes: u64 },
    /// The server has no such file.
    NotFound,
}

#[derive(Debug)]
pub struct ReceiveSession<L> {
    link: L,
    config: ProtocolConfig,
    state: ReceiverState,
    reassembler: Reassembler,
}

impl<L: Link> ReceiveSession<L> {
    pub fn new(link: L, config: ProtocolConfig) -> Self {
        Self {
            link,
            config,
            state: ReceiverState::RequestSent,
            reassembler: Reassembler::new(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Fetch `remote_path` into the local file `output`.
    ///
    /// The output file is created up front and removed again if the server
    /// reports the file missing.
    pub async fn fetch(
        &mut self,
        remote_path: &str,
        output: &Path,
    ) -> Result<ReceiveOutcome, TransferError> {
        let mut file = store::create_output(output).await?;
        let result = self.fetch_into(remote_path, &mut file).await;
        match &result {
            Ok(ReceiveOutcome::Complete { .. }) => file.sync_all().await?,
            Ok(ReceiveOutcome::NotFound) => {
                drop(file);
                if let Err(e) = tokio::fs::remove_file(output).await {
                    log::warn!("[recv] could not remove {}: {e}", output.display());
                }
            }
            Err(e) => log::warn!("[recv] leaving partial {} ({e})", output.display()),
        }
        result
    }

    /// Fetch `remote_path`, writing the file contents to `out` in order.
    pub async fn fetch_into<W: AsyncWrite + Unpin>(
        &mut self,
        remote_path: &str,
        out: &mut W,
    ) -> Result<ReceiveOutcome, TransferError> {
        self.config.validate()?;
        let timer = self.config.timer;
        let request = Packet::file_request(remote_path);
        send_packet(&mut self.link, &request).await?;
        self.state = ReceiverState::RequestSent;
        log::debug!("[recv] → REQUEST {remote_path:?}");

        let mut request_resent = false;
        let mut idle = RetryBudget::new("waiting for data", timer.max_retries);
        loop {
            let mut received = 0u32;
            while received < self.config.window_size {
                let wait = match (received, self.state) {
                    (0, ReceiverState::RequestSent) => timer.request_timeout,
                    (0, _) => timer.exchange_timeout,
                    _ => timer.batch_linger,
                };
                let packet = match recv_packet(&mut self.link, wait).await? {
                    Incoming::Packet(p) => p,
                    Incoming::Timeout => break,
                };
                received += 1;

                match packet.opcode() {
                    Opcode::Data => {
                        self.state = self.state.on_opcode(Opcode::Data);
                        if !self.reassembler.accept(packet.seq(), &packet.payload) {
                            log::trace!("[recv] ← DATA seq={} (duplicate)", packet.seq());
                        }
                    }
                    Opcode::FileNotFound => return self.abort_missing().await,
                    Opcode::Done => return self.complete(packet.seq(), out).await,
                    op => log::debug!("[recv] ignoring {op} while {}", self.state),
                }
            }

            if received == 0 {
                if self.state == ReceiverState::RequestSent && !request_resent {
                    request_resent = true;
                    send_packet(&mut self.link, &request).await?;
                    log::debug!("[recv] ↻ REQUEST {remote_path:?}");
                    continue;
                }
                if let Err(e) = idle.on_timeout() {
                    self.state = ReceiverState::Failed;
                    return Err(e);
                }
            } else {
                idle.reset();
            }

            if self.state == ReceiverState::ReceivingData {
                let written = self.reassembler.flush_to(out).await?;
                let next = self.reassembler.ack_value();
                send_packet(&mut self.link, &Packet::ack(next)).await?;
                log::debug!(
                    "[recv] → ACK next={next} (batch {received}, wrote {written}, held {})",
                    self.reassembler.pending()
                );
            }
        }
    }

    async fn abort_missing(&mut self) -> Result<ReceiveOutcome, TransferError> {
        self.state = self.state.on_opcode(Opcode::FileNotFound);
        send_packet(&mut self.link, &Packet::control(Opcode::FileNotFoundAck, 0)).await?;
        log::debug!("[recv] ← NOT_FOUND; → NOT_FOUND_ACK");
        Ok(ReceiveOutcome::NotFound)
    }

    async fn complete<W: AsyncWrite + Unpin>(
        &mut self,
        done_seq: u32,
        out: &mut W,
    ) -> Result<ReceiveOutcome, TransferError> {
        self.reassembler.flush_to(out).await?;
        out.flush().await?;
        send_packet(&mut self.link, &Packet::control(Opcode::DoneAck, done_seq)).await?;
        log::debug!("[recv] ← DONE seq={done_seq}; → DONE_ACK");

        let written = self.reassembler.write_cursor();
        if written < done_seq {
            self.state = ReceiverState::Failed;
            return Err(TransferError::Incomplete {
                expected: done_seq,
                written,
            });
        }
        self.state = self.state.on_opcode(Opcode::Done);
        let bytes = self.reassembler.bytes_written();
        log::info!("[recv] received {bytes} bytes in {written} chunk(s)");
        Ok(ReceiveOutcome::Complete {
            chunks: written,
            bytes,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
