//! Fault-injecting link wrapper.
//!
//! Real networks drop, corrupt and duplicate datagrams.  To exercise the
//! recovery paths without depending on actual network conditions,
//! [`Simulator`] wraps any [`Link`] and applies a configurable fault model to
//! everything *sent* through it:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.        |
//! | Corruption  | Flip one random bit with probability `corrupt_rate`. |
//! | Duplication | Deliver a datagram twice with `duplicate_rate`.      |
//!
//! With a `seed` the fault sequence is reproducible.  With every rate at
//! zero the simulator is a transparent pass-through, which is how the CLI
//! runs by default.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TransferError;
use crate::link::Link;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub duplicate_rate: f64,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        for (name, p) in [
            ("loss rate", self.loss_rate),
            ("corrupt rate", self.corrupt_rate),
            ("duplicate rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(TransferError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_transparent(&self) -> bool {
        self.loss_rate == 0.0 && self.corrupt_rate == 0.0 && self.duplicate_rate == 0.0
    }
}

/// Counters of the faults injected so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub sent: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

#[derive(Debug)]
pub struct Simulator<L> {
    inner: L,
    config: SimulatorConfig,
    rng: StdRng,
    stats: SimulatorStats,
}

impl<L: Link> Simulator<L> {
    pub fn new(inner: L, config: SimulatorConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            inner,
            config,
            rng,
            stats: SimulatorStats::default(),
        })
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }
}

impl<L: Link + Send> Link for Simulator<L> {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), TransferError> {
        self.stats.sent += 1;
        if self.rng.gen_bool(self.config.loss_rate) {
            self.stats.dropped += 1;
            log::trace!("[sim] dropped {}-byte datagram", datagram.len());
            return Ok(());
        }

        let mut bytes = datagram.to_vec();
        if !bytes.is_empty() && self.rng.gen_bool(self.config.corrupt_rate) {
            let bit = self.rng.gen_range(0..bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            self.stats.corrupted += 1;
            log::trace!("[sim] flipped bit {bit}");
        }

        self.inner.send(&bytes).await?;
        if self.rng.gen_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            self.inner.send(&bytes).await?;
        }
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransferError> {
        self.inner.recv(wait).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
