//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! The config is built once at startup and passed into each component's
//! constructor — there are no ambient globals.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture and the speech-endpoint detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate the endpoint detector operates at (Hz).  Capture is
    /// resampled to this rate before frames reach the detector.
    pub sample_rate: u32,
    /// Frame size in samples (30 ms at 16 kHz = 480).
    pub frame_size: usize,
    /// Base RMS threshold below which a frame never counts as speech.
    pub base_threshold: f32,
    /// Speech threshold = `ambient_rms * noise_multiplier`, floored at
    /// `base_threshold` and clamped to `[min_threshold, max_threshold]`.
    pub noise_multiplier: f32,
    /// Lower clamp for the adaptive threshold.
    pub min_threshold: f32,
    /// Upper clamp for the adaptive threshold.
    pub max_threshold: f32,
    /// Number of pre-speech frames the rolling ambient estimate averages.
    pub noise_sample_frames: usize,
    /// Consecutive loud frames required before speech is confirmed.
    pub debounce_frames: usize,
    /// Silence run (seconds) that ends an utterance once speech is confirmed.
    pub quick_silence_secs: f32,
    /// Quiet lead-in (seconds) retained as pre-roll while waiting for speech
    /// to begin; older audio is trimmed so a soft start is not clipped.
    pub wait_silence_secs: f32,
    /// Utterances shorter than this are discarded as noise (seconds).
    pub min_utterance_secs: f32,
    /// Hard cutoff on utterance length (seconds), even if energy stays high.
    pub max_utterance_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 480,
            base_threshold: 0.010,
            noise_multiplier: 2.5,
            min_threshold: 0.006,
            max_threshold: 0.060,
            noise_sample_frames: 20,
            debounce_frames: 3,
            quick_silence_secs: 0.8,
            wait_silence_secs: 4.0,
            min_utterance_secs: 0.3,
            max_utterance_secs: 15.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutConfig
// ---------------------------------------------------------------------------

/// Named session timeouts.  The state machine selects one per state:
/// `short` for the opening exchange, `normal` for conversational follow-ups,
/// `long` while the user performs a physical step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub short_secs: u64,
    pub normal_secs: u64,
    pub long_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            short_secs: 15,
            normal_secs: 15,
            long_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// ClassifierConfig
// ---------------------------------------------------------------------------

/// Thresholds for the outcome classification cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum cosine similarity for the semantic tier to accept a category.
    pub semantic_threshold: f32,
    /// Acceptance bar for the weighted-keyword tier.
    pub keyword_threshold: f32,
    /// Emergency override bar.  Deliberately below the other thresholds so
    /// the cascade under-triggers on completions, never on emergencies.
    pub emergency_threshold: f32,
    /// Score bonus applied when recent assistant turns match a category's
    /// continuity pattern.
    pub context_bonus: f32,
    /// Number of recent turns inspected for the context bonus.
    pub context_window: usize,
    /// Confidence reported by the conservative default tier.
    pub default_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.7,
            keyword_threshold: 0.5,
            emergency_threshold: 0.4,
            context_bonus: 0.2,
            context_window: 4,
            default_confidence: 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the response-generation backend (any OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the API endpoint.
    pub base_url: String,
    /// API key — `None` for local providers that need no authentication.
    pub api_key: Option<String>,
    /// Chat model identifier.
    pub model: String,
    /// Embedding model identifier used by the semantic classifier tier.
    pub embedding_model: String,
    /// Sampling temperature.  Kept low so responses stay short and
    /// instruction-shaped.
    pub temperature: f32,
    /// Maximum tokens per generated response.
    pub max_tokens: u32,
    /// Maximum seconds to wait for a response before timing out.
    pub timeout_secs: u64,
    /// Generation attempts before the failure escalates to the apology path.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4-turbo".into(),
            embedding_model: "text-embedding-3-small".into(),
            temperature: 0.5,
            max_tokens: 500,
            timeout_secs: 20,
            max_retries: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the external speech-to-text and text-to-speech services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Base URL of the speech API.
    pub base_url: String,
    /// API key for the speech service.
    pub api_key: Option<String>,
    /// STT model identifier.
    pub stt_model: String,
    /// TTS voice identifier.
    pub voice_id: String,
    /// TTS model identifier.
    pub tts_model: String,
    /// PCM sample rate requested from the TTS service (Hz).
    pub output_rate: u32,
    /// Maximum seconds to wait for a speech API call.
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key: None,
            stt_model: "scribe_v1".into(),
            voice_id: "pNInz6obpgDQGcFmaJgB".into(),
            tts_model: "eleven_turbo_v2_5".into(),
            output_rate: 24_000,
            timeout_secs: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// HardwareConfig
// ---------------------------------------------------------------------------

/// Settings for the kit-box lid sensor bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Consecutive identical readings required to confirm an edge.
    pub confirm_count: usize,
    /// Polling interval of the sensor task (milliseconds).
    pub poll_interval_ms: u64,
    /// Sysfs GPIO value file exported for the reed switch (for example
    /// `/sys/class/gpio/gpio17/value`).  `None` disables the lid sensor;
    /// sessions then start from the wake word only.
    #[serde(default)]
    pub sensor_path: Option<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            confirm_count: 5,
            poll_interval_ms: 200,
            sensor_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use solstis::config::AppConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = AppConfig::load().unwrap();
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name the assistant addresses the user by.
    pub user_name: String,
    /// Audio capture / endpoint detector settings.
    pub audio: AudioConfig,
    /// Session timeout durations.
    pub timeouts: TimeoutConfig,
    /// Classification cascade thresholds.
    pub classifier: ClassifierConfig,
    /// Response-generation settings.
    pub llm: LlmConfig,
    /// STT / TTS service settings.
    pub speech: SpeechConfig,
    /// Lid sensor settings.
    pub hardware: HardwareConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_name: "User".into(),
            audio: AudioConfig::default(),
            timeouts: TimeoutConfig::default(),
            classifier: ClassifierConfig::default(),
            llm: LlmConfig::default(),
            speech: SpeechConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
