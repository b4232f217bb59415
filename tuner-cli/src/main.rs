//! # Tuner - Console Front End
//!
//! Wires the default input device to the pitch estimator and prints the
//! nearest note of the selected tuning whenever the reading changes.
//!
//! ## Architecture
//! - **Audio Thread**: CPAL callback framing buffers and running the estimator
//! - **Main Thread**: receives readings and classifies them against the tuning
//! - **Communication**: Crossbeam channel carrying `Reading`s
//!
//! ## Usage
//! ```text
//! tuner [TUNING] [--config FILE] [--seconds N] [--list]
//! ```
//! `TUNING` is a built-in tuning name or a JSON tuning file.

use anyhow::{Context, Result, bail};
use crossbeam_channel::RecvTimeoutError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};
use tuner_core::{
    AnalysisResult, AudioSource, EstimatorConfig, PitchEstimator, Reading, Tuning, audio, tuning,
};

/// Readings buffered between the audio thread and the console loop.
const READING_QUEUE: usize = 64;

#[derive(Debug, Default)]
struct Options {
    tuning: Option<String>,
    config: Option<String>,
    seconds: Option<f64>,
    list: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" => options.list = true,
            "--config" => {
                options.config = Some(args.next().context("--config needs a file")?);
            }
            "--seconds" => {
                let value = args.next().context("--seconds needs a value")?;
                options.seconds = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid --seconds value '{}'", value))?,
                );
            }
            other if other.starts_with("--") => bail!("unknown option '{}'", other),
            other => options.tuning = Some(other.to_string()),
        }
    }
    Ok(options)
}

/// Resolves a built-in tuning name or loads a JSON tuning file.
fn load_tuning(name_or_path: Option<&str>) -> Result<Tuning> {
    let Some(name_or_path) = name_or_path else {
        return Ok(tuning::standard().clone());
    };
    if let Some(builtin) = tuning::builtin(name_or_path) {
        return Ok(builtin.clone());
    }
    if Path::new(name_or_path).exists() {
        return load_json(name_or_path);
    }
    bail!(
        "'{}' is neither a built-in tuning ({}) nor a file",
        name_or_path,
        tuning::builtin_names().collect::<Vec<_>>().join(", ")
    )
}

fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("cannot open '{}'", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("cannot parse '{}'", path))
}

fn print_tunings() {
    for name in tuning::builtin_names() {
        if let Some(tuning) = tuning::builtin(name) {
            let notes: Vec<&str> = tuning.notes().iter().map(|n| n.name.as_str()).collect();
            println!("{:<16} {}", name, notes.join(" "));
        }
    }
}

fn describe(reading: Reading, tuning: &Tuning) -> String {
    match AnalysisResult::classify(reading, tuning) {
        Some(result) => format!(
            "{:<4} {:>8.2} Hz  {:>+7.1} cents  (magnitude {:.3})",
            result.note.name, result.detected_frequency, result.cents_deviation, result.magnitude
        ),
        None if reading.frequency > 0.0 => format!(
            "--   {:>8.2} Hz  outside {} ({:.2}-{:.2} Hz)",
            reading.frequency,
            tuning.name(),
            tuning.minimum_frequency(),
            tuning.maximum_frequency()
        ),
        None => "--   no pitch".to_string(),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let options = parse_args()?;
    if options.list {
        print_tunings();
        return Ok(());
    }

    let tuning = load_tuning(options.tuning.as_deref())?;
    let config: EstimatorConfig = match options.config.as_deref() {
        Some(path) => load_json(path)?,
        None => EstimatorConfig::default(),
    };
    config.validate()?;

    log::info!("Tuning: {} ({} notes)", tuning.name(), tuning.notes().len());

    // The stream stops when dropped, so it lives until main returns.
    let (stream, source) = audio::start_audio_capture(&config)?;
    let estimator = PitchEstimator::with_config(source.clone(), config)?;

    let (reading_tx, reading_rx) = crossbeam_channel::bounded::<Reading>(READING_QUEUE);
    estimator.set_on_change(move |reading| {
        // Console falling behind only skips intermediate readings.
        let _ = reading_tx.try_send(reading);
    });

    log::info!(
        "Listening at {} Hz with {}-sample buffers",
        source.sample_rate(),
        source.frame_size()
    );

    let deadline = options
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds.max(0.0)));
    let mut last_line = String::new();

    loop {
        let timeout = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            },
            None => Duration::from_secs(1),
        };

        match reading_rx.recv_timeout(timeout) {
            Ok(reading) => {
                let line = describe(reading, &tuning);
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    estimator.dispose();
    drop(stream);
    log::info!("Stopped listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_tuning_defaults_to_standard() {
        assert_eq!(load_tuning(None).unwrap().name(), "standard");
        assert_eq!(load_tuning(Some("drop-d")).unwrap().notes()[0].name, "D2");
        assert!(load_tuning(Some("no-such-tuning")).is_err());
    }

    #[test]
    fn test_describe() {
        let tuning = tuning::standard();
        let line = describe(
            Reading {
                frequency: 110.0,
                magnitude: 0.4,
            },
            tuning,
        );
        assert!(line.starts_with("A2"), "{}", line);
        assert_eq!(describe(Reading::default(), tuning), "--   no pitch");
        let line = describe(
            Reading {
                frequency: 40.0,
                magnitude: 0.4,
            },
            tuning,
        );
        assert!(line.contains("outside standard"), "{}", line);
    }
}
