//! One-shot text-to-speech: request a single audio payload and play it.
//!
//! The speech endpoint returns 24 kHz mono 16-bit PCM. Most output devices
//! refuse a 24 kHz stream, so playback runs at 48 kHz with each sample
//! doubled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client::generate_content;
use super::error::ApiError;

/// Sample rate of the audio the service returns.
pub const SOURCE_SAMPLE_RATE: u32 = 24000;

/// Device-side playback rate.
pub const PLAYBACK_SAMPLE_RATE: u32 = 48000;

/// Request speech for `text` and return raw 24 kHz mono PCM bytes.
pub fn synthesize_speech(
    base_url: &str,
    api_key: &str,
    model: &str,
    voice: &str,
    text: &str,
) -> Result<Vec<u8>, ApiError> {
    let payload = serde_json::json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice },
                },
            },
        },
    });
    let response = generate_content(base_url, api_key, model, payload)?;
    parse_audio_payload(&response)
        .ok_or_else(|| ApiError::EmptyResult("the service returned no audio".to_string()))
}

/// Synthesize and play to the default output device, blocking until the
/// buffer drains. Meant to run on a background thread.
pub fn speak_blocking(
    base_url: &str,
    api_key: &str,
    model: &str,
    voice: &str,
    text: &str,
) -> Result<(), ApiError> {
    let pcm = synthesize_speech(base_url, api_key, model, voice, text)?;
    println!("[Tts] playing {} bytes of speech", pcm.len());
    let player = AudioPlayer::new(PLAYBACK_SAMPLE_RATE);
    player.play(&pcm);
    player.drain();
    Ok(())
}

fn parse_audio_payload(response: &serde_json::Value) -> Option<Vec<u8>> {
    let parts = response
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    for part in parts {
        if let Some(data) = part
            .get("inlineData")
            .and_then(|d| d.get("data"))
            .and_then(|d| d.as_str())
        {
            if let Ok(bytes) = crate::pcm::decode_base64(data) {
                return Some(bytes);
            }
        }
    }
    None
}

/// Simple push-model audio player over cpal. Samples pile into a shared
/// queue and the output callback drains it, padding with silence when empty.
pub struct AudioPlayer {
    stream: Option<cpal::Stream>,
    shared_buffer: Arc<Mutex<VecDeque<i16>>>,
}

impl AudioPlayer {
    pub fn new(sample_rate: u32) -> Self {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let shared_buffer: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let buffer_clone = shared_buffer.clone();

        let host = cpal::default_host();
        let device = host.default_output_device();
        if device.is_none() {
            eprintln!("[Tts] no audio output device found");
        }

        let stream = device.and_then(|device| {
            // Stereo: many devices refuse mono. The mono source feeds both
            // channels.
            let config = cpal::StreamConfig {
                channels: 2,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            match device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut buf = buffer_clone.lock().unwrap();
                    for frame in data.chunks_mut(2) {
                        let sample = buf.pop_front().unwrap_or(0) as f32 / 32768.0;
                        frame[0] = sample;
                        frame[1] = sample;
                    }
                },
                |err| eprintln!("[Tts] audio error: {}", err),
                None,
            ) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    eprintln!("[Tts] failed to create output stream: {}", e);
                    None
                }
            }
        });

        if let Some(ref s) = stream {
            if let Err(e) = s.play() {
                eprintln!("[Tts] failed to start stream: {}", e);
            }
        }

        Self {
            stream,
            shared_buffer,
        }
    }

    /// Queue raw 24 kHz PCM bytes, doubling each sample up to 48 kHz.
    pub fn play(&self, pcm: &[u8]) {
        let mut samples = Vec::with_capacity(pcm.len());
        for sample in crate::pcm::bytes_to_samples(pcm) {
            samples.push(sample);
            samples.push(sample);
        }
        if let Ok(mut buf) = self.shared_buffer.lock() {
            buf.extend(samples);
        }
    }

    /// Block until the queue is empty, plus a grace period for the hardware.
    pub fn drain(&self) {
        if self.stream.is_none() {
            return;
        }
        loop {
            let len = self.shared_buffer.lock().map(|b| b.len()).unwrap_or(0);
            if len == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn audio_payload_is_decoded_from_inline_data() {
        let pcm = crate::pcm::samples_to_bytes(&[100, -100, 0, 32000]);
        let resp = json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/pcm;rate=24000",
                            "data": crate::pcm::encode_base64(&pcm)
                        }
                    }]
                }
            }]
        });
        assert_eq!(parse_audio_payload(&resp).unwrap(), pcm);
    }

    #[test]
    fn missing_audio_yields_none() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [{ "text": "silence" }] } }]
        });
        assert!(parse_audio_payload(&resp).is_none());
    }
}
