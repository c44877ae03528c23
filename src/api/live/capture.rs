//! Microphone capture for the live voice session.

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Rate the voice endpoint expects for input audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Start microphone capture. Device samples are mixed to mono, converted to
/// 16-bit PCM and linearly resampled to 16 kHz before landing in the shared
/// buffer. Returns the cpal Stream that must be kept alive.
pub fn start_mic_capture(
    audio_buffer: Arc<Mutex<Vec<i16>>>,
    stop_signal: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No microphone available. Please connect a microphone."))?;
    let config = device.default_input_config()?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    let resample_ratio = CAPTURE_SAMPLE_RATE as f64 / sample_rate as f64;
    let err_fn = |err| eprintln!("[Live] capture stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &_| {
                if stop_signal.load(Ordering::Relaxed) {
                    return;
                }

                let mono_samples: Vec<i16> = data
                    .chunks(channels)
                    .map(|frame| {
                        let sum: f32 = frame.iter().sum();
                        let avg = sum / channels as f32;
                        (avg.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    })
                    .collect();

                let resampled: Vec<i16> = if resample_ratio < 1.0 {
                    let new_len = (mono_samples.len() as f64 * resample_ratio) as usize;
                    (0..new_len)
                        .map(|i| {
                            let src_idx = i as f64 / resample_ratio;
                            let idx0 = src_idx as usize;
                            let idx1 = (idx0 + 1).min(mono_samples.len() - 1);
                            let frac = src_idx - idx0 as f64;
                            let s0 = mono_samples[idx0] as f64;
                            let s1 = mono_samples[idx1] as f64;
                            (s0 + frac * (s1 - s0)) as i16
                        })
                        .collect()
                } else {
                    mono_samples
                };

                if let Ok(mut buf) = audio_buffer.lock() {
                    buf.extend(resampled.iter().cloned());
                }
            },
            err_fn,
            None,
        )?,
        _ => return Err(anyhow::anyhow!("Unsupported audio format")),
    };

    stream.play()?;
    Ok(stream)
}
