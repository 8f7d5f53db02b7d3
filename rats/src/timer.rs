//! Timeout and retry policy.
//!
//! Every blocking receive in a session carries an explicit timeout, and that
//! timeout is the retransmission clock: there is no RTT estimation and no
//! exponential back-off.  This module provides:
//! - [`TimerConfig`] — the per-phase waits and retry limits.
//! - [`RetryBudget`] — counts consecutive timeouts in one phase and turns an
//!   exhausted budget into [`TransferError::RetriesExhausted`].

use std::time::Duration;

use crate::error::TransferError;

/// Wait for the first response to a `FileRequest`.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Wait for an ACK, a data batch or a closing handshake packet.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
/// Wait for further datagrams once a receive batch has started.
pub const BATCH_LINGER: Duration = Duration::from_millis(200);
/// Consecutive timeouts tolerated in one phase.
pub const MAX_RETRIES: u32 = 10;
/// Extra `FileNotFound` transmissions after the first.
pub const NOT_FOUND_RETRIES: u32 = 1;

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub request_timeout: Duration,
    pub exchange_timeout: Duration,
    pub batch_linger: Duration,
    pub max_retries: u32,
    pub not_found_retries: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            exchange_timeout: EXCHANGE_TIMEOUT,
            batch_linger: BATCH_LINGER,
            max_retries: MAX_RETRIES,
            not_found_retries: NOT_FOUND_RETRIES,
        }
    }
}

/// Consecutive-timeout counter for one phase of a session.
///
/// Call [`RetryBudget::on_timeout`] each time a wait expires and
/// [`RetryBudget::reset`] whenever the peer makes progress.
#[derive(Debug)]
pub struct RetryBudget {
    phase: &'static str,
    limit: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(phase: &'static str, limit: u32) -> Self {
        Self {
            phase,
            limit,
            used: 0,
        }
    }

    /// Record one expired wait.
    ///
    /// Returns the number of timeouts seen so far, or an error once more than
    /// `limit` consecutive timeouts have occurred.
    pub fn on_timeout(&mut self) -> Result<u32, TransferError> {
        self.used += 1;
        if self.used > self.limit {
            return Err(TransferError::RetriesExhausted {
                phase: self.phase,
                attempts: self.used,
            });
        }
        Ok(self.used)
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let t = TimerConfig::default();
        assert_eq!(t.request_timeout, Duration::from_secs(2));
        assert_eq!(t.exchange_timeout, Duration::from_secs(5));
        assert_eq!(t.not_found_retries, 1);
    }

    #[test]
    fn budget_allows_limit_timeouts() {
        let mut b = RetryBudget::new("testing", 3);
        assert_eq!(b.on_timeout().unwrap(), 1);
        assert_eq!(b.on_timeout().unwrap(), 2);
        assert_eq!(b.on_timeout().unwrap(), 3);
        match b.on_timeout() {
            Err(TransferError::RetriesExhausted { phase, attempts }) => {
                assert_eq!(phase, "testing");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn reset_restores_full_budget() {
        let mut b = RetryBudget::new("testing", 1);
        b.on_timeout().unwrap();
        b.reset();
        assert_eq!(b.used(), 0);
        assert!(b.on_timeout().is_ok());
        assert!(b.on_timeout().is_err());
    }

    #[test]
    fn zero_limit_fails_on_first_timeout() {
        let mut b = RetryBudget::new("testing", 0);
        assert!(b.on_timeout().is_err());
    }
}
