//! Sending side of a transfer (the server's half of a session).
//!
//! [`SendSession`] owns one [`Link`] to one client and drives it through
//! [`SenderState`]:
//!
//! 1. [`SendSession::await_request`] waits for a `FileRequest`.
//! 2. [`SendSession::serve`] resolves the path and either streams the file or
//!    runs the `FileNotFound` handshake.
//! 3. The stream loop sends the whole window, waits for a cumulative ACK,
//!    slides, and repeats.  A timeout resends the whole window (go back N).
//! 4. Once every chunk is acknowledged, `Done(total_chunks)` is sent until a
//!    `DoneAck` arrives or the retry budget runs out.
//!
//! A `DoneAck` or `FileNotFoundAck` received while streaming means the
//! receiver has already given up on this session; the sender stops at once.

use std::path::Path;

use tokio::io::AsyncRead;

use crate::config::ProtocolConfig;
use crate::error::TransferError;
use crate::link::{recv_packet, send_packet, Incoming, Link};
use crate::packet::{Opcode, Packet};
use crate::send_window::{AckOutcome, SendWindow};
use crate::state::SenderState;
use crate::store;
use crate::timer::RetryBudget;

/// How a send session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every chunk was acknowledged.  `confirmed` is false when the final
    /// `DoneAck` never arrived.
    Delivered {
        chunks: u32,
        bytes: u64,
        confirmed: bool,
    },
    /// The requested file could not be served.
    FileMissing { acknowledged: bool },
    /// The receiver ended the session before the transfer finished.
    Terminated,
}

#[derive(Debug)]
pub struct SendSession<L> {
    link: L,
    config: ProtocolConfig,
    state: SenderState,
}

impl<L: Link> SendSession<L> {
    pub fn new(link: L, config: ProtocolConfig) -> Self {
        Self {
            link,
            config,
            state: SenderState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Block until a `FileRequest` arrives and return the requested path.
    ///
    /// Anything else received meanwhile is ignored.
    pub async fn await_request(&mut self) -> Result<String, TransferError> {
        loop {
            match recv_packet(&mut self.link, self.config.timer.exchange_timeout).await? {
                Incoming::Packet(p) if p.opcode() == Opcode::FileRequest => {
                    let path = String::from_utf8_lossy(&p.payload).into_owned();
                    log::debug!("[send] ← REQUEST {path:?}");
                    return Ok(path);
                }
                Incoming::Packet(p) => {
                    log::debug!("[send] ignoring {} while {}", p.opcode(), self.state);
                }
                Incoming::Timeout => {}
            }
        }
    }

    /// Serve `requested` from below `root`.
    pub async fn serve(&mut self, root: &Path, requested: &str) -> Result<SendOutcome, TransferError> {
        let opened = match store::resolve(root, requested) {
            Some(path) => store::open_for_read(&path).await,
            None => {
                log::warn!("[send] refusing path {requested:?}");
                None
            }
        };
        match opened {
            Some((file, size)) => self.send_from(file, size).await,
            None => self.report_missing().await,
        }
    }

    /// Stream `size` bytes from `source`, then close with `Done`.
    pub async fn send_from<R: AsyncRead + Unpin>(
        &mut self,
        source: R,
        size: u64,
    ) -> Result<SendOutcome, TransferError> {
        self.config.validate()?;
        self.state = SenderState::Sending;
        let mut window = SendWindow::open(
            source,
            size,
            self.config.window_size,
            self.config.chunk_size,
        )
        .await?;
        log::info!(
            "[send] {size} bytes in {} chunk(s), window {}",
            window.total_chunks(),
            self.config.window_size
        );

        let mut retries = RetryBudget::new("waiting for ACK", self.config.timer.max_retries);
        let mut resend = false;
        while !window.is_complete() {
            for packet in window.data_packets() {
                send_packet(&mut self.link, &packet).await?;
            }
            log::debug!(
                "[send] {} DATA seq={}..={}",
                if resend { "↻" } else { "→" },
                window.window_start(),
                window.window_end()
            );

            match recv_packet(&mut self.link, self.config.timer.exchange_timeout).await? {
                Incoming::Timeout => {
                    let attempt = self.fail_on_exhaustion(retries.on_timeout())?;
                    log::debug!("[send] timeout #{attempt}; resending window");
                    resend = true;
                }
                Incoming::Packet(p) => match p.opcode() {
                    Opcode::Ack => {
                        resend = false;
                        let next = match p.ack_value() {
                            Ok(next) => next,
                            Err(e) => {
                                log::debug!("[send] dropped malformed ACK: {e}");
                                continue;
                            }
                        };
                        match window.on_ack(next).await? {
                            AckOutcome::Advanced(n) => {
                                retries.reset();
                                log::debug!("[send] ← ACK next={next} (slid {n})");
                            }
                            outcome => log::debug!("[send] ← ACK next={next} ignored ({outcome:?})"),
                        }
                    }
                    op @ (Opcode::DoneAck | Opcode::FileNotFoundAck) => {
                        self.state = self.state.on_opcode(op);
                        log::warn!("[send] ← {op} mid-transfer; terminating session");
                        return Ok(SendOutcome::Terminated);
                    }
                    op => log::debug!("[send] ignoring {op} while {}", self.state),
                },
            }
        }

        self.finish(window.total_chunks(), size).await
    }

    /// Send `Done` until it is acknowledged or the retry budget runs out.
    async fn finish(&mut self, chunks: u32, bytes: u64) -> Result<SendOutcome, TransferError> {
        self.state = SenderState::Closing;
        let done = Packet::control(Opcode::Done, chunks);
        let mut retries = RetryBudget::new("waiting for DONE_ACK", self.config.timer.max_retries);
        loop {
            send_packet(&mut self.link, &done).await?;
            log::debug!("[send] → DONE seq={chunks}");

            match recv_packet(&mut self.link, self.config.timer.exchange_timeout).await? {
                Incoming::Packet(p) if p.opcode() == Opcode::DoneAck => {
                    self.state = self.state.on_opcode(Opcode::DoneAck);
                    log::info!("[send] delivered {bytes} bytes in {chunks} chunk(s)");
                    return Ok(SendOutcome::Delivered {
                        chunks,
                        bytes,
                        confirmed: true,
                    });
                }
                Incoming::Packet(p) => {
                    log::debug!("[send] ignoring {} while {}", p.opcode(), self.state);
                }
                Incoming::Timeout => {
                    if retries.on_timeout().is_err() {
                        self.state = SenderState::Done;
                        log::warn!("[send] DONE never acknowledged; closing anyway");
                        return Ok(SendOutcome::Delivered {
                            chunks,
                            bytes,
                            confirmed: false,
                        });
                    }
                }
            }
        }
    }

    /// Tell the receiver the file is missing and wait for its acknowledgement.
    pub async fn report_missing(&mut self) -> Result<SendOutcome, TransferError> {
        self.state = SenderState::FileMissing;
        let not_found = Packet::control(Opcode::FileNotFound, 0);
        for attempt in 0..=self.config.timer.not_found_retries {
            send_packet(&mut self.link, &not_found).await?;
            log::debug!("[send] → NOT_FOUND (attempt {})", attempt + 1);

            match recv_packet(&mut self.link, self.config.timer.exchange_timeout).await? {
                Incoming::Packet(p) if p.opcode() == Opcode::FileNotFoundAck => {
                    self.state = self.state.on_opcode(Opcode::FileNotFoundAck);
                    log::debug!("[send] ← NOT_FOUND_ACK");
                    return Ok(SendOutcome::FileMissing { acknowledged: true });
                }
                Incoming::Packet(p) => {
                    log::debug!("[send] ignoring {} while {}", p.opcode(), self.state);
                }
                Incoming::Timeout => {}
            }
        }
        self.state = SenderState::Terminated;
        log::warn!("[send] NOT_FOUND never acknowledged");
        Ok(SendOutcome::FileMissing {
            acknowledged: false,
        })
    }

    fn fail_on_exhaustion(&mut self, attempt: Result<u32, TransferError>) -> Result<u32, TransferError> {
        if attempt.is_err() {
            self.state = SenderState::Failed;
        }
        attempt
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
