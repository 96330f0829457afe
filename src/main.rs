//! Application entry point — Solstis first-aid assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. Build the pipeline collaborators: STT, generation, classification,
//!    speech output, status sink.
//! 5. Create the session channels (`events`, `interrupts`).
//! 6. Spawn the lid-sensor polling task (when a sensor is configured).
//! 7. Start the cpal capture stream and the endpoint bridge thread.
//! 8. Install the Ctrl-C handler.
//! 9. Run the session loop — blocks until shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use solstis::{
    audio::{
        resample_to_16k, stereo_to_mono, AudioCapture, AudioChunk, EndpointDetector,
        EndpointSignal, FrameAssembler,
    },
    classify::{ApiEmbedder, OutcomeClassifier, SemanticScorer},
    config::AppConfig,
    hardware,
    llm::{ApiGenerator, ResponseGenerator, RetryGenerator},
    session::{SessionEvent, SessionRunner},
    speech::{ApiSynth, ApiTranscriber, AudioPlayback, DeviceSpeaker, Speaker, Transcriber},
    status::{LogStatusSink, StatusSink},
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("solstis starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 workers — the pipeline tasks are I/O bound)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    // 4. Pipeline collaborators
    let transcriber: Arc<dyn Transcriber> = Arc::new(ApiTranscriber::from_config(&config.speech));

    let generator: Arc<dyn ResponseGenerator> = Arc::new(RetryGenerator::new(
        ApiGenerator::from_config(&config.llm, &config.user_name),
        config.llm.max_retries,
    ));

    // The semantic tier needs an embeddings backend; without an API key the
    // classifier degrades to keywords plus the default tier.
    let semantic = if config.llm.api_key.is_some() {
        Some(SemanticScorer::new(Box::new(ApiEmbedder::new(&config.llm))))
    } else {
        log::warn!("no LLM API key; semantic classification tier disabled");
        None
    };
    let classifier = Arc::new(OutcomeClassifier::new(config.classifier.clone(), semantic));

    let speaker: Arc<dyn Speaker> = match AudioPlayback::new(config.speech.output_rate) {
        Ok(playback) => Arc::new(DeviceSpeaker::new(
            Arc::new(ApiSynth::from_config(&config.speech)),
            Arc::new(playback),
        )),
        Err(e) => {
            log::warn!("Audio output unavailable ({e}); responses will only be logged");
            Arc::new(LogSpeaker)
        }
    };

    let status: Arc<dyn StatusSink> = Arc::new(LogStatusSink);

    // 5. Channel setup
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(32);
    let (interrupt_tx, interrupt_rx) = mpsc::channel::<hardware::BoxEvent>(8);

    let runner = SessionRunner::new(
        config.clone(),
        transcriber,
        generator,
        classifier,
        speaker,
        status,
        events_tx.clone(),
    );
    let epoch = runner.capture_epoch();

    // 6. Lid sensor polling task
    match config.hardware.sensor_path.clone() {
        Some(path) => {
            let hw = config.hardware.clone();
            let tx = interrupt_tx.clone();
            rt.spawn(async move {
                let path = std::path::PathBuf::from(path);
                hardware::run_sensor_loop(hw, move || hardware::read_sysfs_gpio(&path), tx).await;
            });
        }
        None => log::info!("no lid sensor configured; sessions start from the wake word"),
    }

    // 7. cpal capture stream + endpoint bridge thread.
    //    Raw chunks are downmixed, resampled to 16 kHz, framed, and run
    //    through the endpoint detector; completed utterances become events.
    let _stream_handle: Option<solstis::audio::StreamHandle> = match AudioCapture::new() {
        Ok(capture) => {
            let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<AudioChunk>();

            let bridge_tx = events_tx.clone();
            let audio_config = config.audio.clone();
            let epoch = Arc::clone(&epoch);
            std::thread::Builder::new()
                .name("endpoint-bridge".into())
                .spawn(move || {
                    let mut assembler = FrameAssembler::new(audio_config.frame_size);
                    let mut detector = EndpointDetector::new(audio_config);
                    let mut seen_epoch = epoch.load(Ordering::SeqCst);

                    while let Ok(chunk) = chunk_rx.recv() {
                        // The session loop bumps the epoch when a capture in
                        // progress must be abandoned (timeout, reset).
                        let current = epoch.load(Ordering::SeqCst);
                        if current != seen_epoch {
                            seen_epoch = current;
                            detector.cancel();
                        }

                        let mono = if chunk.channels > 1 {
                            stereo_to_mono(&chunk.samples, chunk.channels)
                        } else {
                            chunk.samples
                        };
                        let samples = if chunk.sample_rate != 16_000 {
                            resample_to_16k(&mono, chunk.sample_rate)
                        } else {
                            mono
                        };

                        assembler.push(&samples);
                        while let Some(frame) = assembler.next_frame() {
                            if detector.observe(&frame) == EndpointSignal::SpeechEnded {
                                if let Some(utterance) = detector.take_utterance() {
                                    let event = SessionEvent::UtteranceCaptured(utterance);
                                    if bridge_tx.blocking_send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                })
                .expect("failed to spawn endpoint-bridge thread");

            let fault_tx = events_tx.clone();
            match capture.start(chunk_tx, move |message| {
                let _ = fault_tx.blocking_send(SessionEvent::AudioFault(message));
            }) {
                Ok(handle) => {
                    log::info!(
                        "Audio capture started ({} Hz, {} ch)",
                        capture.sample_rate(),
                        capture.channels()
                    );
                    Some(handle)
                }
                Err(e) => {
                    log::error!("Failed to start audio stream: {e}");
                    None
                }
            }
        }
        Err(e) => {
            log::error!("Audio capture unavailable: {e}");
            None
        }
    };

    // 8. Ctrl-C → clean shutdown
    {
        let tx = events_tx.clone();
        rt.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("shutdown requested");
                let _ = tx.send(SessionEvent::Shutdown).await;
            }
        });
    }

    // 9. Session loop — blocks until shutdown.
    let session = rt.block_on(runner.run(events_rx, interrupt_rx));
    if session.emergency {
        log::warn!("shut down with the emergency flag still set");
    }
    log::info!("solstis stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// LogSpeaker — fallback Speaker when no output device is present
// ---------------------------------------------------------------------------

struct LogSpeaker;

#[async_trait]
impl Speaker for LogSpeaker {
    async fn say(&self, text: &str) {
        log::info!("(no audio output) would say: {text}");
    }
}
