//! The speaking boundary used by the session loop.
//!
//! [`Speaker::say`] waits for synthesis but not for playback: the session
//! loop continues as soon as audio starts, and a new user utterance is
//! accepted while the device is still talking.  Failures are logged, never
//! propagated; a silent assistant with a live LED is better than a stalled
//! session.

use std::sync::Arc;

use async_trait::async_trait;

use super::playback::AudioPlayback;
use super::tts::SpeechSynth;

/// Fire-and-forget speech output.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn say(&self, text: &str);
}

/// [`Speaker`] backed by a TTS service and the device's output stream.
pub struct DeviceSpeaker {
    synth: Arc<dyn SpeechSynth>,
    playback: Arc<AudioPlayback>,
}

impl DeviceSpeaker {
    pub fn new(synth: Arc<dyn SpeechSynth>, playback: Arc<AudioPlayback>) -> Self {
        Self { synth, playback }
    }
}

#[async_trait]
impl Speaker for DeviceSpeaker {
    async fn say(&self, text: &str) {
        log::info!("speaking: {text:?}");
        match self.synth.synthesize(text).await {
            Ok(audio) => {
                let playback = Arc::clone(&self.playback);
                // Playback blocks a worker thread; the session loop moves on.
                tokio::task::spawn_blocking(move || {
                    if let Err(err) = playback.play(audio) {
                        log::error!("playback failed: {err}");
                    }
                });
            }
            Err(err) => log::error!("speech synthesis failed: {err}"),
        }
    }
}
