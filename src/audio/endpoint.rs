//! Speech-endpoint detection: turning a continuous frame stream into
//! discrete utterances.
//!
//! [`EndpointDetector`] consumes fixed-size 16 kHz mono frames and decides
//! where a spoken utterance begins and ends, without a fixed loudness
//! threshold:
//!
//! * A rolling ambient-noise estimate is kept from recent pre-speech frames
//!   and frozen while speech is in progress, so the detector never learns
//!   the user's own voice as noise.
//! * A frame is provisionally speech when its RMS exceeds
//!   `max(base_threshold, ambient * noise_multiplier)`, clamped to the
//!   configured bounds.  Speech is confirmed only after a debounce run of
//!   consecutive provisional frames.
//! * End-of-speech uses a short silence run once speech is confirmed.  While
//!   still waiting for speech, a longer allowance of quiet lead-in is kept
//!   as pre-roll so a soft start is not clipped.  A hard maximum-duration
//!   cutoff forces the end even if energy stays high (sustained appliance
//!   hum must not capture forever).
//! * Utterances shorter than the minimum duration are discarded as noise.
//!
//! [`FrameAssembler`] reframes arbitrary-length resampled buffers into the
//! fixed frame size the detector expects.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// EndpointSignal
// ---------------------------------------------------------------------------

/// Result of observing one audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSignal {
    /// Nothing decisive happened; keep feeding frames.
    Continue,
    /// A debounce run of loud frames confirmed the start of speech.
    SpeechStarted,
    /// An utterance completed; collect it with
    /// [`EndpointDetector::take_utterance`].
    SpeechEnded,
    /// A speech burst ended but was too short to be a real utterance.
    RejectedNoise,
}

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// One bounded span of captured user speech, ready for transcription.
///
/// Owns its sample buffer; the transcription stage consumes and drops it.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// 16 kHz mono samples, including a short pre-roll before speech onset.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub started_at: Instant,
    pub ended_at: Instant,
    /// Ambient RMS estimate at capture time, for diagnostics.
    pub ambient_rms: f32,
}

impl Utterance {
    /// Duration of the captured buffer in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// EndpointDetector
// ---------------------------------------------------------------------------

enum Phase {
    /// No confirmed speech; ambient estimate is adapting.
    Waiting { provisional_run: usize },
    /// Speech confirmed; ambient estimate is frozen.
    InSpeech {
        total_frames: usize,
        silence_frames: usize,
        started_at: Instant,
    },
}

/// Adaptive energy-based endpoint detector.  See the module docs for the
/// algorithm.
pub struct EndpointDetector {
    config: AudioConfig,
    /// RMS of recent pre-speech frames, newest last.
    ambient: VecDeque<f32>,
    phase: Phase,
    /// Pre-roll plus in-progress speech samples.
    buffer: Vec<f32>,
    /// Completed utterance awaiting collection.
    pending: Option<Utterance>,
}

impl EndpointDetector {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            ambient: VecDeque::new(),
            phase: Phase::Waiting { provisional_run: 0 },
            buffer: Vec::new(),
            pending: None,
        }
    }

    /// Current rolling ambient RMS estimate (`0.0` before any frame).
    pub fn ambient_rms(&self) -> f32 {
        if self.ambient.is_empty() {
            return 0.0;
        }
        self.ambient.iter().sum::<f32>() / self.ambient.len() as f32
    }

    /// Effective speech threshold for the current ambient level.
    pub fn current_threshold(&self) -> f32 {
        (self.ambient_rms() * self.config.noise_multiplier)
            .max(self.config.base_threshold)
            .clamp(self.config.min_threshold, self.config.max_threshold)
    }

    fn frames_for(&self, secs: f32) -> usize {
        let frame_secs = self.config.frame_size as f32 / self.config.sample_rate as f32;
        ((secs / frame_secs).round() as usize).max(1)
    }

    /// Observe one frame of 16 kHz mono audio.
    ///
    /// The frame length should equal the configured frame size; the caller
    /// is expected to reframe with [`FrameAssembler`] first.
    pub fn observe(&mut self, frame: &[f32]) -> EndpointSignal {
        let rms = frame_rms(frame);
        let threshold = self.current_threshold();
        let speechy = rms > threshold;
        let quick_silence = self.frames_for(self.config.quick_silence_secs);
        let max_frames = self.frames_for(self.config.max_utterance_secs);
        let pre_roll_cap = self.frames_for(self.config.wait_silence_secs) * self.config.frame_size;

        match &mut self.phase {
            Phase::Waiting { provisional_run } => {
                self.buffer.extend_from_slice(frame);

                if speechy {
                    *provisional_run += 1;
                    if *provisional_run >= self.config.debounce_frames {
                        let run = *provisional_run;
                        log::debug!(
                            "speech confirmed after {run} frames (rms {rms:.4}, threshold {threshold:.4})"
                        );
                        self.phase = Phase::InSpeech {
                            total_frames: run,
                            silence_frames: 0,
                            started_at: Instant::now(),
                        };
                        return EndpointSignal::SpeechStarted;
                    }
                    return EndpointSignal::Continue;
                }

                // Quiet frame: adapt the ambient estimate and reset the run.
                self.ambient.push_back(rms);
                while self.ambient.len() > self.config.noise_sample_frames {
                    self.ambient.pop_front();
                }
                *provisional_run = 0;

                // Keep a bounded quiet lead-in so a soft start of speech is
                // not clipped; anything older than the allowance is dropped.
                if self.buffer.len() > pre_roll_cap {
                    let excess = self.buffer.len() - pre_roll_cap;
                    self.buffer.drain(..excess);
                }

                EndpointSignal::Continue
            }

            Phase::InSpeech {
                total_frames,
                silence_frames,
                started_at,
            } => {
                self.buffer.extend_from_slice(frame);
                *total_frames += 1;

                if speechy {
                    *silence_frames = 0;
                } else {
                    *silence_frames += 1;
                }

                let silence_ended = *silence_frames >= quick_silence;
                let cutoff = *total_frames >= max_frames;
                if !silence_ended && !cutoff {
                    return EndpointSignal::Continue;
                }

                if cutoff && !silence_ended {
                    log::warn!(
                        "utterance hit the {:.1}s hard cutoff",
                        self.config.max_utterance_secs
                    );
                }

                let voiced_frames = total_frames.saturating_sub(*silence_frames);
                let started = *started_at;
                let frame_secs = self.config.frame_size as f32 / self.config.sample_rate as f32;
                let voiced_secs = voiced_frames as f32 * frame_secs;

                self.phase = Phase::Waiting { provisional_run: 0 };
                let samples = std::mem::take(&mut self.buffer);

                if voiced_secs < self.config.min_utterance_secs {
                    log::debug!("discarding {voiced_secs:.2}s burst as noise");
                    return EndpointSignal::RejectedNoise;
                }

                self.pending = Some(Utterance {
                    samples,
                    sample_rate: self.config.sample_rate,
                    started_at: started,
                    ended_at: Instant::now(),
                    ambient_rms: self.ambient_rms(),
                });
                EndpointSignal::SpeechEnded
            }
        }
    }

    /// Collect the utterance completed by the last `SpeechEnded` signal.
    pub fn take_utterance(&mut self) -> Option<Utterance> {
        self.pending.take()
    }

    /// Abandon any in-progress capture and pending utterance.
    ///
    /// Used when a session timeout or hardware interrupt fires mid-capture:
    /// the half-recorded utterance must never reach transcription.  The
    /// ambient estimate survives the reset.
    pub fn cancel(&mut self) {
        self.phase = Phase::Waiting { provisional_run: 0 };
        self.buffer.clear();
        self.pending = None;
    }
}

fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt()
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Reframes arbitrary-length sample buffers into fixed-size frames.
///
/// cpal delivers whatever buffer size the platform chooses; the detector
/// wants exact frames.  Push resampled mono audio in, pull full frames out.
pub struct FrameAssembler {
    frame_size: usize,
    backlog: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            backlog: Vec::new(),
        }
    }

    /// Append samples to the backlog.
    pub fn push(&mut self, samples: &[f32]) {
        self.backlog.extend_from_slice(samples);
    }

    /// Pop the next full frame, or `None` if not enough samples buffered.
    pub fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.backlog.len() < self.frame_size {
            return None;
        }
        let frame: Vec<f32> = self.backlog.drain(..self.frame_size).collect();
        Some(frame)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 10 ms frames at 16 kHz with thresholds sized for the constant-level
    /// frames the tests feed in.
    fn test_config() -> AudioConfig {
        AudioConfig {
            sample_rate: 16_000,
            frame_size: 160,
            base_threshold: 0.010,
            noise_multiplier: 2.5,
            min_threshold: 0.006,
            max_threshold: 0.060,
            noise_sample_frames: 5,
            debounce_frames: 3,
            quick_silence_secs: 0.05,  // 5 frames
            wait_silence_secs: 0.20,   // 20 frames
            min_utterance_secs: 0.06,  // 6 frames
            max_utterance_secs: 0.50,  // 50 frames
        }
    }

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 160]
    }

    fn feed(detector: &mut EndpointDetector, level: f32, count: usize) -> Vec<EndpointSignal> {
        (0..count).map(|_| detector.observe(&frame(level))).collect()
    }

    // ---- start detection ---

    #[test]
    fn speech_starts_after_debounce_run() {
        let mut detector = EndpointDetector::new(test_config());
        let signals = feed(&mut detector, 0.5, 3);
        assert_eq!(
            signals,
            vec![
                EndpointSignal::Continue,
                EndpointSignal::Continue,
                EndpointSignal::SpeechStarted,
            ]
        );
    }

    #[test]
    fn single_spike_does_not_start_speech() {
        let mut detector = EndpointDetector::new(test_config());
        detector.observe(&frame(0.5));
        // The spike ends; quiet frames follow.
        let signals = feed(&mut detector, 0.001, 10);
        assert!(signals.iter().all(|s| *s == EndpointSignal::Continue));
    }

    // ---- end detection ---

    #[test]
    fn utterance_completes_after_quick_silence() {
        let mut detector = EndpointDetector::new(test_config());
        feed(&mut detector, 0.5, 10); // SpeechStarted at frame 3
        let signals = feed(&mut detector, 0.001, 5);
        assert_eq!(signals.last(), Some(&EndpointSignal::SpeechEnded));

        let utterance = detector.take_utterance().expect("utterance pending");
        assert_eq!(utterance.sample_rate, 16_000);
        // 10 loud + 5 silent frames captured, 160 samples each.
        assert!(utterance.samples.len() >= 15 * 160);
        // Second take yields nothing.
        assert!(detector.take_utterance().is_none());
    }

    #[test]
    fn short_burst_is_rejected_as_noise() {
        let mut detector = EndpointDetector::new(test_config());
        // 3 loud frames confirm speech, then immediate silence: only 3
        // voiced frames, below the 6-frame minimum.
        feed(&mut detector, 0.5, 3);
        let signals = feed(&mut detector, 0.001, 5);
        assert_eq!(signals.last(), Some(&EndpointSignal::RejectedNoise));
        assert!(detector.take_utterance().is_none());
    }

    #[test]
    fn max_duration_forces_end_while_still_loud() {
        let mut detector = EndpointDetector::new(test_config());
        // 50-frame hard cutoff with no silence at all.
        let signals = feed(&mut detector, 0.5, 50);
        assert_eq!(signals.last(), Some(&EndpointSignal::SpeechEnded));
        let utterance = detector.take_utterance().expect("cutoff utterance");
        assert!(utterance.duration_secs() <= 0.55);
        // Detector is ready for the next utterance afterwards.
        let next = feed(&mut detector, 0.5, 3);
        assert_eq!(next.last(), Some(&EndpointSignal::SpeechStarted));
    }

    // ---- pre-roll ---

    #[test]
    fn long_idle_keeps_only_the_pre_roll_allowance() {
        let mut detector = EndpointDetector::new(test_config());
        // A long quiet stretch before speech must not all end up in the
        // captured utterance.
        feed(&mut detector, 0.001, 100);
        feed(&mut detector, 0.5, 10);
        let signals = feed(&mut detector, 0.001, 5);
        assert_eq!(signals.last(), Some(&EndpointSignal::SpeechEnded));

        let utterance = detector.take_utterance().expect("utterance pending");
        // 20 frames of quiet lead-in (wait_silence_secs) plus the 10 loud
        // and 5 silent frames captured.
        assert_eq!(utterance.samples.len(), 35 * 160);
    }

    // ---- adaptive threshold ---

    #[test]
    fn ambient_noise_raises_threshold() {
        let mut config = test_config();
        config.base_threshold = 0.004;
        config.min_threshold = 0.002;

        // Fresh detector: 0.005 exceeds the base threshold and starts speech.
        let mut fresh = EndpointDetector::new(config.clone());
        let signals = feed(&mut fresh, 0.005, 3);
        assert_eq!(signals.last(), Some(&EndpointSignal::SpeechStarted));

        // Primed detector: ambient 0.003 lifts the threshold to 0.0075 and
        // the same level no longer counts as speech.
        let mut primed = EndpointDetector::new(config);
        feed(&mut primed, 0.003, 5);
        assert!(primed.current_threshold() > 0.005);
        let signals = feed(&mut primed, 0.005, 6);
        assert!(signals.iter().all(|s| *s == EndpointSignal::Continue));
    }

    #[test]
    fn ambient_estimate_frozen_during_speech() {
        let mut detector = EndpointDetector::new(test_config());
        feed(&mut detector, 0.002, 5);
        let before = detector.ambient_rms();
        assert!(before > 0.0);

        // Long loud stretch must not leak into the ambient estimate.
        feed(&mut detector, 0.5, 30);
        assert!((detector.ambient_rms() - before).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_clamped_to_bounds() {
        let mut detector = EndpointDetector::new(test_config());
        // Very loud "ambient" would push the threshold past the max clamp.
        // Use sub-threshold frames near the base so they count as quiet.
        feed(&mut detector, 0.009, 5);
        assert!(detector.current_threshold() <= test_config().max_threshold);
        assert!(detector.current_threshold() >= test_config().min_threshold);
    }

    // ---- cancellation ---

    #[test]
    fn cancel_discards_capture_in_progress() {
        let mut detector = EndpointDetector::new(test_config());
        feed(&mut detector, 0.5, 10);
        detector.cancel();
        assert!(detector.take_utterance().is_none());

        // Silence after cancel stays quiet: no phantom SpeechEnded.
        let signals = feed(&mut detector, 0.001, 10);
        assert!(signals.iter().all(|s| *s == EndpointSignal::Continue));
    }

    #[test]
    fn cancel_discards_pending_utterance() {
        let mut detector = EndpointDetector::new(test_config());
        feed(&mut detector, 0.5, 10);
        feed(&mut detector, 0.001, 5); // SpeechEnded
        detector.cancel();
        assert!(detector.take_utterance().is_none());
    }

    // ---- FrameAssembler ---

    #[test]
    fn assembler_reframes_odd_buffers() {
        let mut assembler = FrameAssembler::new(160);
        assembler.push(&vec![0.1_f32; 100]);
        assert!(assembler.next_frame().is_none());

        assembler.push(&vec![0.1_f32; 100]);
        let frame = assembler.next_frame().expect("one full frame");
        assert_eq!(frame.len(), 160);
        // 40 samples left over.
        assert!(assembler.next_frame().is_none());
    }

    #[test]
    fn assembler_yields_multiple_frames() {
        let mut assembler = FrameAssembler::new(160);
        assembler.push(&vec![0.2_f32; 480]);
        assert!(assembler.next_frame().is_some());
        assert!(assembler.next_frame().is_some());
        assert!(assembler.next_frame().is_some());
        assert!(assembler.next_frame().is_none());
    }
}
