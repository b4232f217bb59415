//! Per-buffer estimation results.

/// The best pitch candidate found in one sample buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferInformation {
    /// Frequency in Hz, 0 when no usable pitch was found.
    pub frequency: f64,
    /// Normalized autocorrelation strength at the winning lag.
    pub magnitude: f64,
}

impl BufferInformation {
    /// No usable pitch in this buffer.
    pub const UNKNOWN: BufferInformation = BufferInformation {
        frequency: 0.0,
        magnitude: 0.0,
    };

    pub fn new(frequency: f64, magnitude: f64) -> Self {
        Self {
            frequency,
            magnitude,
        }
    }

    pub fn has_frequency(&self) -> bool {
        self.frequency > 0.0
    }
}

impl Default for BufferInformation {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// A buffer counts as silence when it has fewer than two samples or the
/// second-to-last sample is exactly zero.
pub(crate) fn is_silent(samples: &[f32]) -> bool {
    match samples.len().checked_sub(2) {
        Some(index) => samples[index] == 0.0,
        None => true,
    }
}

/// Normalized autocorrelation scan over lags `low_period..high_period`.
///
/// Returns the first lag with the strictly greatest value converted to a
/// frequency. A winning frequency outside `[lowest, highest]` is reported as
/// 0 Hz while keeping its magnitude.
///
/// The caller guarantees `samples.len() >= high_period`.
pub(crate) fn autocorrelate(
    samples: &[f32],
    sample_rate: u32,
    low_period: usize,
    high_period: usize,
    lowest: f64,
    highest: f64,
) -> BufferInformation {
    let len = samples.len();
    let mut greatest_magnitude = f64::NEG_INFINITY;
    let mut best_period = 0;

    // A zero lag has no frequency.
    for period in low_period.max(1)..high_period {
        let sum: f64 = samples[..len - period]
            .iter()
            .zip(&samples[period..])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        let magnitude = sum / len as f64;

        if magnitude > greatest_magnitude {
            greatest_magnitude = magnitude;
            best_period = period;
        }
    }

    if best_period == 0 {
        return BufferInformation::UNKNOWN;
    }

    let frequency = sample_rate as f64 / best_period as f64;
    if (lowest..=highest).contains(&frequency) {
        BufferInformation::new(frequency, greatest_magnitude)
    } else {
        BufferInformation::new(0.0, greatest_magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signal::sine;

    #[test]
    fn test_silence_detection() {
        assert!(is_silent(&[]));
        assert!(is_silent(&[0.5]));
        assert!(is_silent(&[0.5, 0.0, 0.5]));
        assert!(!is_silent(&[0.0, 0.1, 0.0]));
        assert!(is_silent(&vec![0.0f32; 1024]));
    }

    #[test]
    fn test_autocorrelate_finds_period_of_sine() {
        // 200 Hz at 8 kHz is exactly 40 samples per cycle
        let samples = sine(200.0, 8000, 1024, 1.0);
        let info = autocorrelate(&samples, 8000, 22, 320, 25.0, 350.0);
        assert_eq!(info.frequency, 200.0);
        assert!(info.magnitude > 0.4, "magnitude {}", info.magnitude);
    }

    #[test]
    fn test_autocorrelate_out_of_range_keeps_magnitude() {
        let samples = sine(200.0, 8000, 1024, 1.0);
        // Range excludes 200 Hz
        let info = autocorrelate(&samples, 8000, 22, 320, 25.0, 150.0);
        assert_eq!(info.frequency, 0.0);
        assert!(info.magnitude > 0.4);
    }

    #[test]
    fn test_autocorrelate_ties_prefer_smallest_lag() {
        // A lone impulse has zero autocorrelation at every lag, so the first
        // lag scanned wins.
        let mut samples = vec![0.0f32; 64];
        samples[0] = 1.0;
        let info = autocorrelate(&samples, 800, 4, 32, 1.0, 1000.0);
        assert_eq!(info.frequency, 200.0);
        assert_eq!(info.magnitude, 0.0);
    }

    #[test]
    fn test_autocorrelate_empty_lag_range() {
        let samples = sine(200.0, 8000, 64, 1.0);
        assert_eq!(
            autocorrelate(&samples, 8000, 0, 1, 25.0, 350.0),
            BufferInformation::UNKNOWN
        );
    }
}
