//! Audio playback to the speaker via `cpal`.
//!
//! Playback is blocking by design: it runs on `spawn_blocking` from the
//! session loop's speaking task, and the caller decides whether to wait.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use thiserror::Error;

use super::tts::SpokenAudio;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device available")]
    NoDevice,

    #[error("no suitable output config found")]
    NoConfig,

    #[error("output stream error: {0}")]
    Stream(String),
}

// ---------------------------------------------------------------------------
// AudioPlayback
// ---------------------------------------------------------------------------

/// Plays synthesized speech on the default output device.
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at `sample_rate` (mono preferred,
    /// stereo fallback).
    pub fn new(sample_rate: u32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or(PlaybackError::NoConfig)?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        log::debug!(
            "audio playback ready: {} Hz, {} channel(s)",
            sample_rate,
            config.channels
        );

        Ok(Self { config })
    }

    /// Play `audio` to completion.  Blocks the calling thread; run it under
    /// `tokio::task::spawn_blocking`.
    pub fn play(&self, audio: SpokenAudio) -> Result<(), PlaybackError> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;

        let config = self.config.clone();
        let channels = config.channels as usize;

        let sample_count = audio.samples.len();
        let sample_rate = audio.sample_rate;

        let samples = Arc::new(audio.samples);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(Mutex::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = match position_cb.lock() {
                        Ok(pos) => pos,
                        Err(_) => return,
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < samples_cb.len() {
                            let s = samples_cb[*pos];
                            *pos += 1;
                            s
                        } else {
                            if let Ok(mut done) = finished_cb.lock() {
                                *done = true;
                            }
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    log::error!("audio playback error: {err}");
                },
                None,
            )
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        // Poll for completion with a timeout derived from the clip length.
        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);
        loop {
            let done = finished.lock().map(|d| *d).unwrap_or(true);
            if done || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        // Let the device drain its last buffer.
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        log::debug!("playback complete ({sample_count} samples)");
        Ok(())
    }
}
