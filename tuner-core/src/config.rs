//! Detection range and smoothing parameters for the pitch estimator.

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Highest detectable fundamental in Hz.
pub const HIGHEST_FREQUENCY: f64 = 350.0;

/// Lowest detectable fundamental in Hz.
pub const LOWEST_FREQUENCY: f64 = 25.0;

/// Seconds a frequency is held through silent or low-confidence buffers.
pub const HOLD_TIME: f64 = 2.0;

/// Autocorrelation strength below which a buffer is treated as unvoiced.
pub const MINIMUM_MAGNITUDE: f64 = 0.05;

/// Shortest buffer a live source should deliver.
pub const MIN_FRAME_SIZE: usize = 2048;

/// How many of the longest scanned lags a live buffer spans.
///
/// The `1 / len` normalization favours short lags, and it takes several
/// periods of overlap before a low string beats the shortest scanned lag.
pub const FRAME_PERIODS: usize = 4;

/// Estimator settings.
///
/// The defaults cover standard guitar and bass tunings. Every field falls
/// back to its default when missing from a deserialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Upper end of the detection range in Hz (default: 350.0)
    pub highest_frequency: f64,

    /// Lower end of the detection range in Hz (default: 25.0)
    pub lowest_frequency: f64,

    /// Hold time in seconds before a stale frequency is cleared (default: 2.0)
    pub hold_time: f64,

    /// Minimum magnitude for a frequency to be reported (default: 0.05)
    pub minimum_magnitude: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            highest_frequency: HIGHEST_FREQUENCY,
            lowest_frequency: LOWEST_FREQUENCY,
            hold_time: HOLD_TIME,
            minimum_magnitude: MINIMUM_MAGNITUDE,
        }
    }
}

impl EstimatorConfig {
    /// Checks that the settings describe a usable detection range.
    pub fn validate(&self) -> Result<(), TunerError> {
        if !self.lowest_frequency.is_finite() || self.lowest_frequency <= 0.0 {
            return Err(TunerError::InvalidConfig(format!(
                "lowest frequency must be positive, got {}",
                self.lowest_frequency
            )));
        }
        if !self.highest_frequency.is_finite() || self.highest_frequency <= self.lowest_frequency {
            return Err(TunerError::InvalidConfig(format!(
                "highest frequency {} must exceed lowest frequency {}",
                self.highest_frequency, self.lowest_frequency
            )));
        }
        if !self.hold_time.is_finite() || self.hold_time < 0.0 {
            return Err(TunerError::InvalidConfig(format!(
                "hold time must be non-negative, got {}",
                self.hold_time
            )));
        }
        if self.minimum_magnitude.is_nan() {
            return Err(TunerError::InvalidConfig(
                "minimum magnitude must be a number".to_string(),
            ));
        }
        Ok(())
    }

    /// Autocorrelation lag bounds `(low, high)` in samples for a sample rate.
    ///
    /// `low = floor(rate / highest)` and `high = ceil(rate / lowest)`; lags
    /// in `low..high` are scanned.
    pub fn periods(&self, sample_rate: u32) -> (usize, usize) {
        let rate = sample_rate as f64;
        let low = (rate / self.highest_frequency).floor() as usize;
        let high = (rate / self.lowest_frequency).ceil() as usize;
        (low, high)
    }

    /// Buffer length a live source should frame its input into.
    ///
    /// Four times the longest lag, rounded up to a power of two: 8192
    /// samples at 44.1 and 48 kHz, which resolves E1 (41.2 Hz). At that
    /// length the practical floor is about 35 Hz; the lowest part of the
    /// range needs longer buffers.
    pub fn frame_size(&self, sample_rate: u32) -> usize {
        let (_, high_period) = self.periods(sample_rate);
        (FRAME_PERIODS * high_period)
            .next_power_of_two()
            .max(MIN_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_contract_constants() {
        let config = EstimatorConfig::default();
        assert_eq!(config.highest_frequency, 350.0);
        assert_eq!(config.lowest_frequency, 25.0);
        assert_eq!(config.hold_time, 2.0);
        assert_eq!(config.minimum_magnitude, 0.05);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_periods_common_rates() {
        let config = EstimatorConfig::default();
        assert_eq!(config.periods(44100), (126, 1764));
        assert_eq!(config.periods(48000), (137, 1920));
        assert_eq!(config.periods(8000), (22, 320));
    }

    #[test]
    fn test_frame_size_spans_four_longest_lags() {
        let config = EstimatorConfig::default();
        assert_eq!(config.frame_size(44100), 8192);
        assert_eq!(config.frame_size(48000), 8192);
        assert_eq!(config.frame_size(96000), 16384);
        assert_eq!(config.frame_size(8000), MIN_FRAME_SIZE);
        assert_eq!(config.frame_size(0), MIN_FRAME_SIZE);
        for rate in [8000, 22050, 44100, 48000, 96000] {
            let (_, high) = config.periods(rate);
            assert!(config.frame_size(rate) >= FRAME_PERIODS * high);
        }
    }

    #[test]
    fn test_low_period_below_high_period() {
        let config = EstimatorConfig::default();
        for rate in [1, 25, 349, 350, 8000, 11025, 16000, 22050, 44100, 96000, 192000] {
            let (low, high) = config.periods(rate);
            assert!(low < high, "rate {}: {} >= {}", rate, low, high);
        }
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let config = EstimatorConfig {
            highest_frequency: 20.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TunerError::InvalidConfig(_))));

        let config = EstimatorConfig {
            lowest_frequency: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EstimatorConfig {
            hold_time: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: EstimatorConfig = serde_json::from_str(r#"{ "hold_time": 0.5 }"#).unwrap();
        assert_eq!(config.hold_time, 0.5);
        assert_eq!(config.highest_frequency, HIGHEST_FREQUENCY);
    }
}
