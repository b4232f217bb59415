//! # Pitch Estimation Module
//!
//! Real-time fundamental frequency estimation for the tuner.
//!
//! A [`PitchEstimator`] subscribes to an [`AudioSource`] and runs a
//! normalized autocorrelation scan over every buffer it receives. The
//! published frequency is smoothed across buffers: a valid pitch is held
//! through silent or low-confidence buffers for up to the configured hold
//! time before it drops back to 0 Hz.
//!
//! ## Threading
//! - Buffers are processed synchronously on the source's thread
//! - A single mutex serializes buffer processing and rebinding
//! - `frequency` and `magnitude` are atomics, readable from any thread

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::buffer::{self, BufferInformation};
use crate::config::EstimatorConfig;
use crate::error::TunerError;
use crate::source::{AudioSource, BufferCallback, SubscriptionId};

/// The observable output of the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Frequency in Hz, 0 when nothing is playing.
    pub frequency: f64,
    /// Autocorrelation strength of the latest buffer.
    pub magnitude: f64,
}

/// Callback invoked whenever the frequency or magnitude changes.
pub type ChangeCallback = Arc<dyn Fn(Reading) + Send + Sync>;

/// An `f64` readable and writable without a lock.
#[derive(Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Everything rebinding and buffer processing both touch.
struct Binding {
    source: Arc<dyn AudioSource>,
    subscription: Option<SubscriptionId>,
    /// Incremented on every rebind; buffers tagged with an older value are
    /// dropped.
    generation: u64,
    sample_rate: u32,
    low_period: usize,
    high_period: usize,
    elapsed_silence: f64,
    disposed: bool,
}

struct Shared {
    config: EstimatorConfig,
    frequency: AtomicF64,
    magnitude: AtomicF64,
    binding: Mutex<Binding>,
    on_change: Mutex<Option<ChangeCallback>>,
}

/// Autocorrelation pitch estimator bound to one audio source at a time.
///
/// Dropping the estimator detaches it from its source.
pub struct PitchEstimator {
    shared: Arc<Shared>,
}

impl PitchEstimator {
    /// Creates an estimator with the default detection range and subscribes
    /// it to `source`.
    pub fn new(source: Arc<dyn AudioSource>) -> Result<Self, TunerError> {
        Self::with_config(source, EstimatorConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn AudioSource>,
        config: EstimatorConfig,
    ) -> Result<Self, TunerError> {
        config.validate()?;

        let sample_rate = source.sample_rate();
        let (low_period, high_period) = config.periods(sample_rate);
        log::debug!(
            "Pitch estimator at {} Hz scanning lags {}..{}",
            sample_rate,
            low_period,
            high_period
        );

        let shared = Arc::new(Shared {
            config,
            frequency: AtomicF64::default(),
            magnitude: AtomicF64::default(),
            binding: Mutex::new(Binding {
                source,
                subscription: None,
                generation: 0,
                sample_rate,
                low_period,
                high_period,
                elapsed_silence: 0.0,
                disposed: false,
            }),
            on_change: Mutex::new(None),
        });

        {
            let mut binding = shared.binding.lock();
            Shared::attach(&shared, &mut binding);
        }

        Ok(Self { shared })
    }

    /// Last reported frequency in Hz, 0 when no pitch is held.
    pub fn frequency(&self) -> f64 {
        self.shared.frequency.load()
    }

    /// Magnitude of the most recent buffer.
    pub fn magnitude(&self) -> f64 {
        self.shared.magnitude.load()
    }

    /// Frequency and magnitude together. The two values are read
    /// individually, so a buffer processed in between may mix them.
    pub fn reading(&self) -> Reading {
        self.shared.reading()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.shared.config
    }

    /// Sample rate of the bound source.
    pub fn sample_rate(&self) -> u32 {
        self.shared.binding.lock().sample_rate
    }

    /// Scanned lag bounds `(low, high)` for the bound source.
    pub fn periods(&self) -> (usize, usize) {
        let binding = self.shared.binding.lock();
        (binding.low_period, binding.high_period)
    }

    /// Seconds of silent or low-confidence input since the last valid pitch.
    pub fn elapsed_silence(&self) -> f64 {
        self.shared.binding.lock().elapsed_silence
    }

    /// Registers the change notification, replacing any previous one.
    pub fn set_on_change<F>(&self, callback: F)
    where
        F: Fn(Reading) + Send + Sync + 'static,
    {
        *self.shared.on_change.lock() = Some(Arc::new(callback));
    }

    pub fn clear_on_change(&self) {
        *self.shared.on_change.lock() = None;
    }

    /// Runs one buffer through the estimator as if the bound source had
    /// delivered it.
    ///
    /// Fails when the buffer is shorter than the longest scanned lag.
    pub fn process(&self, samples: &[f32]) -> Result<BufferInformation, TunerError> {
        self.shared.process(None, samples).map(|info| info.unwrap_or_default())
    }

    /// Switches to a different source.
    ///
    /// Detaches from the current source, attaches to `source` and clears the
    /// published state. Rebinding to the source already bound does nothing.
    pub fn set_source(&self, source: Arc<dyn AudioSource>) {
        let before;
        {
            let mut binding = self.shared.binding.lock();
            if binding.disposed {
                log::warn!("Ignoring source change on a disposed pitch estimator");
                return;
            }
            if Arc::ptr_eq(&binding.source, &source) {
                return;
            }

            before = self.shared.reading();
            Shared::detach(&mut binding);

            let sample_rate = source.sample_rate();
            let (low_period, high_period) = self.shared.config.periods(sample_rate);
            binding.source = source;
            binding.sample_rate = sample_rate;
            binding.low_period = low_period;
            binding.high_period = high_period;
            binding.elapsed_silence = 0.0;
            self.shared.frequency.store(0.0);
            self.shared.magnitude.store(0.0);

            Shared::attach(&self.shared, &mut binding);
            log::debug!(
                "Pitch estimator rebound at {} Hz, lags {}..{}",
                sample_rate,
                low_period,
                high_period
            );
        }
        self.shared.notify_if_changed(before);
    }

    /// Detaches from the source. Calling it again does nothing.
    pub fn dispose(&self) {
        let mut binding = self.shared.binding.lock();
        Shared::detach(&mut binding);
        binding.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.binding.lock().disposed
    }
}

impl Drop for PitchEstimator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PitchEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binding = self.shared.binding.lock();
        f.debug_struct("PitchEstimator")
            .field("frequency", &self.frequency())
            .field("magnitude", &self.magnitude())
            .field("sample_rate", &binding.sample_rate)
            .field("elapsed_silence", &binding.elapsed_silence)
            .field("disposed", &binding.disposed)
            .finish()
    }
}

impl Shared {
    fn reading(&self) -> Reading {
        Reading {
            frequency: self.frequency.load(),
            magnitude: self.magnitude.load(),
        }
    }

    /// Subscribes to `binding.source` under a fresh generation.
    fn attach(shared: &Arc<Shared>, binding: &mut Binding) {
        binding.generation += 1;
        let generation = binding.generation;
        // Weak, so the source does not keep a dropped estimator alive.
        let weak: Weak<Shared> = Arc::downgrade(shared);
        let callback: BufferCallback = Arc::new(move |samples: &[f32]| -> Result<(), TunerError> {
            match weak.upgrade() {
                Some(shared) => shared.process(Some(generation), samples).map(|_| ()),
                None => Ok(()),
            }
        });
        binding.subscription = Some(binding.source.subscribe(callback));
    }

    fn detach(binding: &mut Binding) {
        if let Some(id) = binding.subscription.take() {
            binding.source.unsubscribe(id);
        }
    }

    /// Estimates one buffer and updates the published state.
    ///
    /// `generation` is set for buffers delivered through a subscription;
    /// those from a source that is no longer bound yield `Ok(None)`.
    fn process(
        &self,
        generation: Option<u64>,
        samples: &[f32],
    ) -> Result<Option<BufferInformation>, TunerError> {
        let before;
        let info;
        {
            let mut binding = self.binding.lock();
            if let Some(generation) = generation {
                if binding.subscription.is_none() || binding.generation != generation {
                    log::trace!("Dropping buffer from a detached source");
                    return Ok(None);
                }
            }

            before = self.reading();
            info = self.estimate(&mut binding, samples)?;
        }
        self.notify_if_changed(before);
        Ok(Some(info))
    }

    fn estimate(
        &self,
        binding: &mut Binding,
        samples: &[f32],
    ) -> Result<BufferInformation, TunerError> {
        if samples.len() < binding.high_period {
            return Err(TunerError::InsufficientBuffer {
                length: samples.len(),
                required: binding.high_period,
                sample_rate: binding.sample_rate,
            });
        }

        if buffer::is_silent(samples) {
            self.magnitude.store(0.0);
            self.hold_or_reset(binding, samples.len());
            return Ok(BufferInformation::UNKNOWN);
        }

        let info = buffer::autocorrelate(
            samples,
            binding.sample_rate,
            binding.low_period,
            binding.high_period,
            self.config.lowest_frequency,
            self.config.highest_frequency,
        );
        log::trace!(
            "Buffer of {} samples: {:.2} Hz, magnitude {:.4}",
            samples.len(),
            info.frequency,
            info.magnitude
        );

        // Magnitude tracks signal strength even when no frequency resolved.
        self.magnitude.store(info.magnitude);
        if !info.has_frequency() || info.magnitude < self.config.minimum_magnitude {
            self.hold_or_reset(binding, samples.len());
        } else {
            self.frequency.store(info.frequency);
            binding.elapsed_silence = 0.0;
        }
        Ok(info)
    }

    /// Keeps the last frequency through a quiet buffer, clearing it once the
    /// quiet time reaches the hold time.
    fn hold_or_reset(&self, binding: &mut Binding, sample_count: usize) {
        if self.frequency.load() == 0.0 {
            return;
        }
        if binding.sample_rate == 0 {
            self.clear(binding);
            return;
        }

        binding.elapsed_silence += sample_count as f64 / binding.sample_rate as f64;
        if binding.elapsed_silence >= self.config.hold_time {
            log::trace!(
                "Releasing held frequency after {:.2}s without pitch",
                binding.elapsed_silence
            );
            self.clear(binding);
        }
    }

    fn clear(&self, binding: &mut Binding) {
        self.frequency.store(0.0);
        self.magnitude.store(0.0);
        binding.elapsed_silence = 0.0;
    }

    fn notify_if_changed(&self, before: Reading) {
        let after = self.reading();
        if after == before {
            return;
        }
        // Clone out so the callback runs without the lock.
        let callback = self.on_change.lock().clone();
        if let Some(callback) = callback {
            callback(after);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ManualSource;
    use crate::test_signal::sine;

    #[test]
    fn test_periods_follow_source_rate() {
        let source = Arc::new(ManualSource::new(44100));
        let estimator = PitchEstimator::new(source).unwrap();
        assert_eq!(estimator.periods(), (126, 1764));
        assert_eq!(estimator.sample_rate(), 44100);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source = Arc::new(ManualSource::new(8000));
        let config = EstimatorConfig {
            lowest_frequency: 400.0,
            ..Default::default()
        };
        assert!(matches!(
            PitchEstimator::with_config(source, config),
            Err(TunerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_low_magnitude_holds_previous_frequency() {
        let source = Arc::new(ManualSource::new(8000));
        let estimator = PitchEstimator::new(source).unwrap();

        estimator.process(&sine(200.0, 8000, 1000, 1.0)).unwrap();
        assert_eq!(estimator.frequency(), 200.0);

        // Quiet enough to fall below the confidence threshold.
        let info = estimator.process(&sine(110.0, 8000, 1000, 0.1)).unwrap();
        assert!(info.magnitude < 0.05);
        assert_eq!(estimator.frequency(), 200.0);
        assert_eq!(estimator.magnitude(), info.magnitude);
        assert_eq!(estimator.elapsed_silence(), 0.125);
    }

    #[test]
    fn test_zero_hold_time_clears_on_first_quiet_buffer() {
        let source = Arc::new(ManualSource::new(8000));
        let config = EstimatorConfig {
            hold_time: 0.0,
            ..Default::default()
        };
        let estimator = PitchEstimator::with_config(source, config).unwrap();

        estimator.process(&sine(200.0, 8000, 1000, 1.0)).unwrap();
        estimator.process(&vec![0.0f32; 1000]).unwrap();
        assert_eq!(estimator.reading(), Reading::default());
    }

    #[test]
    fn test_zero_sample_rate_source() {
        let source = Arc::new(ManualSource::new(0));
        let estimator = PitchEstimator::new(source).unwrap();
        assert_eq!(estimator.periods(), (0, 0));

        let info = estimator.process(&[0.5, 0.25, 0.5]).unwrap();
        assert_eq!(info, BufferInformation::UNKNOWN);
        assert_eq!(estimator.frequency(), 0.0);
    }

    #[test]
    fn test_degenerate_rate_clears_held_frequency() {
        let estimator = PitchEstimator::new(Arc::new(ManualSource::new(8000))).unwrap();
        estimator.process(&sine(200.0, 8000, 1000, 1.0)).unwrap();

        // Frequency is held while a zero rate is in effect.
        let mut binding = estimator.shared.binding.lock();
        binding.sample_rate = 0;
        estimator.shared.hold_or_reset(&mut binding, 1000);
        assert_eq!(estimator.shared.frequency.load(), 0.0);
        assert_eq!(binding.elapsed_silence, 0.0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let source = Arc::new(ManualSource::new(8000));
        let estimator = PitchEstimator::new(source.clone()).unwrap();
        assert_eq!(source.subscriber_count(), 1);

        estimator.dispose();
        estimator.dispose();
        assert!(estimator.is_disposed());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_detaches() {
        let source = Arc::new(ManualSource::new(8000));
        {
            let _estimator = PitchEstimator::new(source.clone()).unwrap();
            assert_eq!(source.subscriber_count(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
        source.push(&sine(200.0, 8000, 1000, 1.0)).unwrap();
    }
}
