// tuner-core/src/lib.rs

//! The core logic for the guitar tuner.
//! This crate estimates the pitch of incoming audio buffers and matches it
//! against the notes of a tuning. It is completely headless and contains no
//! GUI code; live device input is behind the `capture` feature.

#[cfg(feature = "capture")]
pub mod audio;
pub mod buffer;
pub mod config;
pub mod error;
pub mod pitch;
pub mod source;
#[cfg(test)]
mod test_signal;
pub mod tuning;

pub use buffer::BufferInformation;
pub use config::EstimatorConfig;
pub use error::TunerError;
pub use pitch::{PitchEstimator, Reading};
pub use source::{AudioSource, ManualSource};
pub use tuning::{NaturalNote, Tuning};

/// A pitch reading classified against a tuning, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// The detected frequency in Hz.
    pub detected_frequency: f64,
    /// The magnitude the frequency was detected with.
    pub magnitude: f64,
    /// The nearest note of the tuning.
    pub note: NaturalNote,
    /// The deviation from the nearest note in cents.
    pub cents_deviation: f64,
}

impl AnalysisResult {
    /// Matches a reading against `tuning`.
    ///
    /// Returns `None` when nothing is playing or the frequency lies outside
    /// the tuning's range.
    pub fn classify(reading: Reading, tuning: &Tuning) -> Option<Self> {
        if reading.frequency <= 0.0 {
            return None;
        }
        let note = tuning.nearest_note(reading.frequency)?;
        Some(Self {
            detected_frequency: reading.frequency,
            magnitude: reading.magnitude,
            note: note.clone(),
            cents_deviation: note.cents_from(reading.frequency),
        })
    }
}
