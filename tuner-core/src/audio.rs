//! # Audio Capture Module
//!
//! Live input through CPAL (Cross-Platform Audio Library), exposed as an
//! [`AudioSource`] the pitch estimator can subscribe to.
//!
//! ## Features
//! - Default input device selection
//! - Mono 32-bit float stream, 44.1 kHz preferred
//! - Framing of device callbacks into fixed-size buffers

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

use crate::config::EstimatorConfig;
use crate::source::{AudioSource, Broadcaster, BufferCallback, SubscriptionId};

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// The capture side of a running input stream.
///
/// Buffers are published on the device's audio thread.
pub struct CaptureSource {
    sample_rate: u32,
    frame_size: usize,
    listeners: Broadcaster,
}

impl CaptureSource {
    /// Samples per published buffer.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl AudioSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn subscribe(&self, callback: BufferCallback) -> SubscriptionId {
        self.listeners.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }
}

/// Starts audio capture from the default input device.
///
/// The returned stream must be kept alive for as long as buffers should
/// flow; dropping it stops capture.
///
/// # Audio Configuration
/// - Sample Rate: 44.1 kHz when supported, otherwise the closest rate
/// - Format: 32-bit float
/// - Channels: Mono (1 channel)
/// - Frame: `EstimatorConfig::frame_size`, 8192 samples (~186ms) at 44.1kHz
pub fn start_audio_capture(config: &EstimatorConfig) -> Result<(cpal::Stream, Arc<CaptureSource>)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = cpal::SampleRate(TARGET_SAMPLE_RATE).clamp(
        supported_config.min_sample_rate(),
        supported_config.max_sample_rate(),
    );
    let stream_config = supported_config.with_sample_rate(sample_rate);

    let sample_rate_val = stream_config.sample_rate().0;
    let stream_config: cpal::StreamConfig = stream_config.into();
    let frame_size = config.frame_size(sample_rate_val);

    log::info!(
        "Selected sample rate: {} Hz, {} samples per buffer",
        sample_rate_val,
        frame_size
    );

    let source = Arc::new(CaptureSource {
        sample_rate: sample_rate_val,
        frame_size,
        listeners: Broadcaster::new(),
    });

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

    // Accumulates device callbacks until a whole frame is available.
    let mut audio_buffer: Vec<f32> = Vec::with_capacity(frame_size * 2);
    let publisher = Arc::clone(&source);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            audio_buffer.extend_from_slice(data);

            while audio_buffer.len() >= frame_size {
                if let Err(err) = publisher.listeners.publish(&audio_buffer[..frame_size]) {
                    log::warn!("Dropped audio frame: {}", err);
                }
                audio_buffer.drain(..frame_size);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, source))
}

/// Picks the mono f32 configuration whose sample rate range lies closest to
/// `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let (min, max) = (c.min_sample_rate().0, c.max_sample_rate().0);
            if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            }
        })
}
