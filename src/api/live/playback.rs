//! Gapless scheduled playback for the live voice session.
//!
//! Inbound audio chunks arrive with network jitter but must play
//! back-to-back with no gaps and no overlap. The scheduler keeps a
//! monotonically advancing `next_start` timestamp: each chunk starts at
//! `max(next_start, now)` and advances `next_start` by its own duration.
//! An interruption discards every scheduled chunk and resets the timeline
//! to zero so the next chunk starts fresh.
//!
//! The playback clock is the number of frames the output device has
//! actually rendered, so scheduled times and audible audio cannot drift.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Sample rate of the audio the model streams down.
pub const MODEL_SAMPLE_RATE: u32 = 24000;

/// Device-side playback rate; model samples are doubled up to it.
pub const OUTPUT_SAMPLE_RATE: u32 = 48000;

#[derive(Clone, Copy, Debug)]
pub struct ScheduledChunk {
    pub id: u64,
    pub start: f64,
    pub duration: f64,
}

/// Pure scheduling bookkeeping, separate from the audio device so the
/// ordering guarantees are testable.
#[derive(Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    scheduled: Vec<ScheduledChunk>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a chunk of `duration` seconds on the timeline given the current
    /// clock. Never schedules in the past; never leaves a gap when the
    /// timeline is already ahead of the clock.
    pub fn schedule(&mut self, now: f64, duration: f64) -> ScheduledChunk {
        let start = if self.next_start < now {
            now
        } else {
            self.next_start
        };
        let chunk = ScheduledChunk {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.next_start = start + duration;
        self.scheduled.push(chunk);
        chunk
    }

    /// Drop bookkeeping for chunks that have finished playing.
    pub fn release_played(&mut self, now: f64) {
        self.scheduled.retain(|c| c.start + c.duration > now);
    }

    /// Barge-in: forget every scheduled chunk and reset the timeline so the
    /// next chunk starts at the clock rather than behind stale audio.
    /// Returns how many chunks were discarded.
    pub fn interrupt(&mut self) -> usize {
        let discarded = self.scheduled.len();
        self.scheduled.clear();
        self.next_start = 0.0;
        discarded
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }
}

/// Output half of the live pipeline: a cpal stream fed from a FIFO queue.
/// The FIFO realizes exactly the scheduler's timeline — chunks are appended
/// back-to-back and an interrupt clears the queue.
pub struct LivePlayer {
    stream: Option<cpal::Stream>,
    queue: Arc<Mutex<VecDeque<i16>>>,
    frames_rendered: Arc<AtomicU64>,
    scheduler: PlaybackScheduler,
}

impl LivePlayer {
    pub fn new() -> Self {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let queue_cb = queue.clone();
        let frames_cb = frames_rendered.clone();

        let host = cpal::default_host();
        let device = host.default_output_device();
        if device.is_none() {
            eprintln!("[Live] no audio output device found");
        }

        let stream = device.and_then(|device| {
            let config = cpal::StreamConfig {
                channels: 2,
                sample_rate: OUTPUT_SAMPLE_RATE,
                buffer_size: cpal::BufferSize::Default,
            };
            match device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut buf = queue_cb.lock().unwrap();
                    for frame in data.chunks_mut(2) {
                        let sample = buf.pop_front().unwrap_or(0) as f32 / 32768.0;
                        frame[0] = sample;
                        frame[1] = sample;
                    }
                    // The clock advances for silence too, like any output
                    // device's.
                    frames_cb.fetch_add((data.len() / 2) as u64, Ordering::Relaxed);
                },
                |err| eprintln!("[Live] audio error: {}", err),
                None,
            ) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    eprintln!("[Live] failed to create output stream: {}", e);
                    None
                }
            }
        });

        if let Some(ref s) = stream {
            if let Err(e) = s.play() {
                eprintln!("[Live] failed to start stream: {}", e);
            }
        }

        Self {
            stream,
            queue,
            frames_rendered,
            scheduler: PlaybackScheduler::new(),
        }
    }

    /// Seconds of audio the device has rendered since the session started.
    pub fn clock(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / OUTPUT_SAMPLE_RATE as f64
    }

    /// Schedule one inbound chunk of raw 24 kHz mono PCM bytes for gapless
    /// playback.
    pub fn enqueue(&mut self, pcm: &[u8]) {
        let samples = crate::pcm::bytes_to_samples(pcm);
        if samples.is_empty() {
            return;
        }
        let now = self.clock();
        let duration = crate::pcm::duration_secs(samples.len(), MODEL_SAMPLE_RATE);
        self.scheduler.release_played(now);
        self.scheduler.schedule(now, duration);

        let mut doubled = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            doubled.push(s);
            doubled.push(s);
        }
        if let Ok(mut buf) = self.queue.lock() {
            buf.extend(doubled);
        }
    }

    /// Barge-in: stop everything scheduled-but-unplayed and reset the
    /// timeline.
    pub fn interrupt(&mut self) {
        if let Ok(mut buf) = self.queue.lock() {
            buf.clear();
        }
        let discarded = self.scheduler.interrupt();
        if discarded > 0 {
            println!("[Live] interrupted, discarded {} pending chunks", discarded);
        }
    }

    pub fn is_audible(&self) -> bool {
        self.stream.is_some()
    }
}
