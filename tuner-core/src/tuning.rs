//! # Musical Tuning Module
//!
//! Reference notes, tunings and nearest-note matching for the tuner.
//!
//! ## Features
//! - Equal-temperament note table (A0 to C8, A4 = 440 Hz)
//! - Built-in guitar and bass tunings
//! - Nearest-note lookup against an ordered tuning
//! - Cent deviation for the tuning needle

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TunerError;

/// A reference note with its name and target frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaturalNote {
    /// Note name (e.g., "E2", "F#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f64,
}

impl NaturalNote {
    pub fn new(name: impl Into<String>, frequency: f64) -> Self {
        Self {
            name: name.into(),
            frequency,
        }
    }

    /// Deviation of `frequency` from this note in cents.
    ///
    /// 100 cents make a semitone; positive means sharp, negative flat.
    pub fn cents_from(&self, frequency: f64) -> f64 {
        1200.0 * (frequency / self.frequency).log2()
    }
}

/// A named set of reference notes, sorted ascending by frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TuningDefinition", into = "TuningDefinition")]
pub struct Tuning {
    name: String,
    notes: Vec<NaturalNote>,
    minimum_frequency: f64,
    maximum_frequency: f64,
}

/// The serialized shape of a tuning, validated through [`Tuning::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TuningDefinition {
    name: String,
    notes: Vec<NaturalNote>,
}

impl TryFrom<TuningDefinition> for Tuning {
    type Error = TunerError;

    fn try_from(definition: TuningDefinition) -> Result<Self, Self::Error> {
        Tuning::new(definition.name, definition.notes)
    }
}

impl From<Tuning> for TuningDefinition {
    fn from(tuning: Tuning) -> Self {
        Self {
            name: tuning.name,
            notes: tuning.notes,
        }
    }
}

impl Tuning {
    /// Builds a tuning, sorting the notes by frequency.
    ///
    /// Notes with equal frequencies keep their given order.
    pub fn new(name: impl Into<String>, mut notes: Vec<NaturalNote>) -> Result<Self, TunerError> {
        let name = name.into();
        if notes.is_empty() {
            return Err(TunerError::EmptyTuning(name));
        }
        if let Some(bad) = notes
            .iter()
            .find(|note| !note.frequency.is_finite() || note.frequency <= 0.0)
        {
            return Err(TunerError::InvalidNote {
                name: bad.name.clone(),
                frequency: bad.frequency,
            });
        }

        notes.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        let minimum_frequency = notes[0].frequency;
        let maximum_frequency = notes[notes.len() - 1].frequency;

        Ok(Self {
            name,
            notes,
            minimum_frequency,
            maximum_frequency,
        })
    }

    /// Builds a tuning from equal-temperament note names like `"E2"`.
    pub fn from_note_names(name: impl Into<String>, note_names: &[&str]) -> Result<Self, TunerError> {
        let notes = note_names
            .iter()
            .map(|&note| {
                note_frequency(note)
                    .map(|frequency| NaturalNote::new(note, frequency))
                    .ok_or_else(|| TunerError::UnknownNote(note.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, notes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Notes in ascending frequency order.
    pub fn notes(&self) -> &[NaturalNote] {
        &self.notes
    }

    pub fn minimum_frequency(&self) -> f64 {
        self.minimum_frequency
    }

    pub fn maximum_frequency(&self) -> f64 {
        self.maximum_frequency
    }

    /// Finds the note closest to `frequency`.
    ///
    /// Returns `None` when `frequency` lies outside
    /// `[minimum_frequency, maximum_frequency]` (NaN included). On an exact
    /// tie the lower note wins.
    pub fn nearest_note(&self, frequency: f64) -> Option<&NaturalNote> {
        if !(self.minimum_frequency..=self.maximum_frequency).contains(&frequency) {
            return None;
        }

        // `min_by` keeps the first of equal elements.
        self.notes.iter().min_by(|a, b| {
            let diff_a = (a.frequency - frequency).abs();
            let diff_b = (b.frequency - frequency).abs();
            diff_a.total_cmp(&diff_b)
        })
    }
}

/// Equal-temperament frequencies for a standard 88-key range (A0 to C8).
///
/// Computed once with A4 = 440 Hz; guitar and bass strings all fall inside.
static NOTES: Lazy<Vec<NaturalNote>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
    ];

    (0..88)
        .map(|i| {
            // A4 is key index 48; f = 440 * 2^(n/12) for n semitones away.
            let frequency = 440.0 * 2.0_f64.powf((i as f64 - 48.0) / 12.0);
            // Octave numbers change at C.
            let octave = (i + 9) / 12;
            NaturalNote::new(format!("{}{}", NOTE_NAMES[i % 12], octave), frequency)
        })
        .collect()
});

/// Note name to index into [`NOTES`].
static NOTE_MAP: Lazy<BTreeMap<String, usize>> = Lazy::new(|| {
    NOTES
        .iter()
        .enumerate()
        .map(|(i, note)| (note.name.clone(), i))
        .collect()
});

/// Equal-temperament frequency of a note name such as `"A4"` or `"F#3"`.
pub fn note_frequency(name: &str) -> Option<f64> {
    NOTE_MAP.get(name).map(|&index| NOTES[index].frequency)
}

const BUILTIN_DEFINITIONS: [(&str, &[&str]); 7] = [
    ("standard", &["E2", "A2", "D3", "G3", "B3", "E4"]),
    ("drop-d", &["D2", "A2", "D3", "G3", "B3", "E4"]),
    ("half-step-down", &["D#2", "G#2", "C#3", "F#3", "A#3", "D#4"]),
    ("open-g", &["D2", "G2", "D3", "G3", "B3", "D4"]),
    ("open-d", &["D2", "A2", "D3", "F#3", "A3", "D4"]),
    ("dadgad", &["D2", "A2", "D3", "G3", "A3", "D4"]),
    ("bass-standard", &["E1", "A1", "D2", "G2"]),
];

static BUILTIN_TUNINGS: Lazy<Vec<Tuning>> = Lazy::new(|| {
    BUILTIN_DEFINITIONS
        .iter()
        .filter_map(|(name, notes)| match Tuning::from_note_names(*name, notes) {
            Ok(tuning) => Some(tuning),
            Err(err) => {
                log::error!("Built-in tuning '{}' is invalid: {}", name, err);
                None
            }
        })
        .collect()
});

/// Looks up a built-in tuning by name.
pub fn builtin(name: &str) -> Option<&'static Tuning> {
    BUILTIN_TUNINGS.iter().find(|tuning| tuning.name == name)
}

/// Names of all built-in tunings, standard tuning first.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_TUNINGS.iter().map(|tuning| tuning.name.as_str())
}

/// Standard six-string guitar tuning (E2 A2 D3 G3 B3 E4).
pub fn standard() -> &'static Tuning {
    &BUILTIN_TUNINGS[0]
}
