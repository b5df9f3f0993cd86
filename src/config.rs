// iio-capture/src/config.rs
//
// Copyright (c) 2018-2021, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Capture configuration.
//!
//! A [`CaptureConfig`] is fixed when a [`Pipeline`](crate::Pipeline) is
//! built. It can be assembled in code with [`CaptureConfig::builder()`] or
//! loaded from a TOML capture profile:
//!
//! ```toml
//! strategy = "fifo_batched"
//! overflow = "abort"
//! wait_timeout_ms = 50
//! poll_rate = 100
//! fifo_watermark = 128
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{strategy::StrategyKind, Error, PollRate, Result, Supervisor};

/// What the interrupt-driven strategies do when the ring buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Record a buffer-full fault and end the session.
    #[default]
    Abort,
    /// Drop the scan, count it, and keep streaming.
    DropScan,
}

/// The on-wire sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireFormat {
    /// Write samples most significant byte first.
    pub big_endian: bool,
}

/// Configuration of a capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// The capture strategy
    pub strategy: StrategyKind,
    /// Ring buffer overflow handling in interrupt context
    pub overflow: OverflowPolicy,
    /// Bound on each hardware wait, in milliseconds
    pub wait_timeout_ms: u64,
    /// Platform poll calibration for the wait bound
    pub poll_rate: PollRate,
    /// FIFO watermark in scans (defaults to the device FIFO depth)
    pub fifo_watermark: Option<usize>,
    /// Scans per half of the DMA window
    pub dma_half_scans: usize,
    /// The on-wire sample layout
    pub output: WireFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            overflow: OverflowPolicy::default(),
            wait_timeout_ms: 100,
            poll_rate: PollRate::default(),
            fifo_watermark: None,
            dma_half_scans: 64,
            output: WireFormat::default(),
        }
    }
}

impl CaptureConfig {
    /// Create a new builder for a capture configuration.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Loads and validates a configuration from a TOML capture profile.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(Error::InvalidConfig("wait timeout must be non-zero".into()));
        }
        if self.poll_rate.polls_per_ms() == 0 {
            return Err(Error::InvalidConfig("poll rate must be non-zero".into()));
        }
        if self.fifo_watermark == Some(0) || self.fifo_watermark > Some(usize::from(u16::MAX)) {
            return Err(Error::InvalidConfig(format!(
                "FIFO watermark out of range: {:?}",
                self.fifo_watermark
            )));
        }
        if self.dma_half_scans == 0 {
            return Err(Error::InvalidConfig("DMA half window must hold a scan".into()));
        }
        Ok(())
    }

    /// The bound on each hardware wait.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// A supervisor applying this configuration's wait bound.
    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.wait_timeout(), self.poll_rate)
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug, Default)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    /// Set the capture strategy.
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the overflow policy for interrupt-driven capture.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// Set the bound on each hardware wait.
    pub fn wait_timeout(mut self, dur: Duration) -> Self {
        self.config.wait_timeout_ms = dur.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    /// Set the platform poll calibration.
    pub fn poll_rate(mut self, rate: PollRate) -> Self {
        self.config.poll_rate = rate;
        self
    }

    /// Set the FIFO watermark, in scans.
    pub fn fifo_watermark(mut self, scans: usize) -> Self {
        self.config.fifo_watermark = Some(scans);
        self
    }

    /// Set the number of scans in each half of the DMA window.
    pub fn dma_half_scans(mut self, scans: usize) -> Self {
        self.config.dma_half_scans = scans;
        self
    }

    /// Write samples big-endian.
    pub fn big_endian(mut self, on: bool) -> Self {
        self.config.output.big_endian = on;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<CaptureConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, StrategyKind::Burst);
        assert_eq!(config.overflow, OverflowPolicy::Abort);
        assert_eq!(config.supervisor().bound().ticks(), 10_000);
    }

    #[test]
    fn builder_validates() {
        let config = CaptureConfig::builder()
            .strategy(StrategyKind::FifoBatched)
            .fifo_watermark(256)
            .wait_timeout(Duration::from_millis(5))
            .build()
            .unwrap();
        assert_eq!(config.fifo_watermark, Some(256));
        assert_eq!(config.wait_timeout_ms, 5);

        assert!(CaptureConfig::builder().fifo_watermark(0).build().is_err());
        assert!(CaptureConfig::builder().dma_half_scans(0).build().is_err());
        assert!(CaptureConfig::builder()
            .wait_timeout(Duration::from_micros(10))
            .build()
            .is_err());
    }

    #[test]
    fn profile_from_toml() {
        let config = CaptureConfig::from_toml_str(
            r#"
            strategy = "continuous_dma"
            overflow = "drop_scan"
            wait_timeout_ms = 20
            poll_rate = 1000
            dma_half_scans = 32

            [output]
            big_endian = true
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, StrategyKind::ContinuousDma);
        assert_eq!(config.overflow, OverflowPolicy::DropScan);
        assert_eq!(config.poll_rate, PollRate::new(1000));
        assert_eq!(config.dma_half_scans, 32);
        assert!(config.output.big_endian);
        assert_eq!(config.fifo_watermark, None);
    }

    #[test]
    fn bad_profiles() {
        assert!(matches!(
            CaptureConfig::from_toml_str("strategy = \"warp\""),
            Err(Error::Profile(_))
        ));
        assert!(matches!(
            CaptureConfig::from_toml_str("bogus = 1"),
            Err(Error::Profile(_))
        ));
        assert!(matches!(
            CaptureConfig::from_toml_str("wait_timeout_ms = 0"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
