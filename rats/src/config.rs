//! Protocol configuration.
//!
//! The window capacity and chunk size are protocol constants in the wire
//! sense (both peers must agree on the chunk size) but are carried here as
//! named configuration so tests and the CLI can vary them.

use crate::error::TransferError;
use crate::packet::MAX_PAYLOAD;
use crate::timer::TimerConfig;

/// Packets in flight per window.
pub const WINDOW_SIZE: u32 = 5;

/// Largest accepted window.
pub const MAX_WINDOW: u32 = 1024;

/// Bytes of file data per `Data` packet.
pub const CHUNK_SIZE: usize = MAX_PAYLOAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub window_size: u32,
    pub chunk_size: usize,
    pub timer: TimerConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            chunk_size: CHUNK_SIZE,
            timer: TimerConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW {
            return Err(TransferError::InvalidConfig(format!(
                "window size must be between 1 and {MAX_WINDOW}, got {}",
                self.window_size
            )));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(TransferError::InvalidConfig(format!(
                "chunk size must be between 1 and {MAX_PAYLOAD}, got {}",
                self.chunk_size
            )));
        }
        let t = &self.timer;
        if t.request_timeout.is_zero() || t.exchange_timeout.is_zero() || t.batch_linger.is_zero() {
            return Err(TransferError::InvalidConfig(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ProtocolConfig::default();
        assert_eq!(c.window_size, 5);
        assert_eq!(c.chunk_size, 1015);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let c = ProtocolConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(TransferError::InvalidConfig(_))));
    }

    #[test]
    fn oversized_window_rejected() {
        let c = ProtocolConfig {
            window_size: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(TransferError::InvalidConfig(_))));
        let c = ProtocolConfig {
            window_size: MAX_WINDOW,
            ..Default::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn oversized_chunk_rejected() {
        let c = ProtocolConfig {
            chunk_size: MAX_PAYLOAD + 1,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        let c = ProtocolConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut c = ProtocolConfig::default();
        c.timer.batch_linger = std::time::Duration::ZERO;
        assert!(c.validate().is_err());
    }
}
