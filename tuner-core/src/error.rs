//! Error types for the tuner core.

use thiserror::Error;

/// Errors surfaced by the estimator and the tuning model.
///
/// "No pitch in this buffer" is never an error: silence, low confidence and
/// out-of-range frequencies are ordinary estimation outcomes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// The buffer is shorter than the longest autocorrelation lag required
    /// for the bound sample rate. This is a setup mismatch between the
    /// source and the detection range, not a signal condition.
    #[error(
        "sample rate insufficient for buffer length: {length} samples at {sample_rate} Hz, \
         at least {required} required"
    )]
    InsufficientBuffer {
        length: usize,
        required: usize,
        sample_rate: u32,
    },

    /// Estimator settings that cannot describe a detection range.
    #[error("invalid estimator configuration: {0}")]
    InvalidConfig(String),

    /// A tuning needs at least one note.
    #[error("tuning '{0}' has no notes")]
    EmptyTuning(String),

    /// A note whose frequency is not a positive, finite number of hertz.
    #[error("note '{name}' has invalid frequency {frequency}")]
    InvalidNote { name: String, frequency: f64 },

    /// A note name missing from the equal-temperament table.
    #[error("unknown note name '{0}'")]
    UnknownNote(String),
}
