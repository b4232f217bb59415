//! Synthetic signals shared by the unit tests.

/// A sine at `frequency` Hz with a small phase offset, so no sample near the
/// end of the buffer lands exactly on zero.
pub(crate) fn sine(frequency: f64, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            amplitude * (2.0 * std::f64::consts::PI * frequency * t + 0.3).sin() as f32
        })
        .collect()
}
