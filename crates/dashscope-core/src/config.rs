//! Connection, recognition and synthesis configuration.
//!
//! Configuration is an explicit value passed to each pipeline constructor.
//! There is no process-wide default instance; callers build one with
//! `Default`, tweak fields, and hand it over. `parameters()` produces the
//! immutable snapshot carried by a task's `run-task` message.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{RealtimeError, Result};

/// Default DashScope realtime inference endpoint.
pub const DEFAULT_WS_URL: &str = "wss://dashscope.aliyuncs.com/api-ws/v1/inference/";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// Environment variable overriding the endpoint URL.
pub const URL_ENV: &str = "DASHSCOPE_WS_URL";

/// Default time to wait for `task-started` after sending `run-task`.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

// ── Reconnect policy ───────────────────────────────────────────────

/// What a pipeline does when input arrives and no task is active.
///
/// Recognition defaults to [`OnDemand`](Self::OnDemand), synthesis to
/// [`Never`](Self::Never): a synthesis turn is restarted explicitly with
/// `interrupt()` or `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Fail with `InvalidState`; the caller reconnects explicitly.
    #[default]
    Never,

    /// Open a fresh session (new task id) before forwarding the input.
    OnDemand,
}

// ── Connection ─────────────────────────────────────────────────────

/// Endpoint and credentials for one realtime connection.
///
/// The API key is never printed by the `Debug` impl.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Websocket endpoint (`ws://` or `wss://`).
    pub url: String,

    api_key: String,

    /// How long opening a session waits for `task-started`.
    ///
    /// `None` makes the `Created → Running` transition optimistic on send.
    pub start_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a config for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            api_key: api_key.into(),
            start_timeout: Some(DEFAULT_START_TIMEOUT),
        }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override (or disable) the start acknowledgment timeout.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Read `DASHSCOPE_API_KEY` and the optional `DASHSCOPE_WS_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RealtimeError::Config(format!("{API_KEY_ENV} is not set")))?;

        let mut config = Self::new(api_key.trim());
        if let Some(url) = lookup(URL_ENV).filter(|url| !url.trim().is_empty()) {
            config.url = url.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Check the URL scheme and key.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(RealtimeError::Config("API key cannot be empty".into()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(RealtimeError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.url
            )));
        }
        Ok(())
    }

    /// The API key with all but the last four characters masked.
    pub fn redacted_key(&self) -> String {
        let visible: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{visible}")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("api_key", &self.redacted_key())
            .field("start_timeout", &self.start_timeout)
            .finish()
    }
}

// ── Recognition ────────────────────────────────────────────────────

/// Recognition (ASR) task configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Recognition model.
    pub model: String,

    /// Input sample rate in Hz.
    pub sample_rate: u32,

    /// Input encoding (`pcm`, `wav`, `mp3`, ...).
    pub format: String,

    /// Custom vocabulary id.
    pub vocabulary_id: Option<String>,

    /// Phrase hint id.
    pub phrase_id: Option<String>,

    /// Drop filler words from transcripts.
    pub disfluency_removal_enabled: bool,

    /// Languages to bias recognition towards.
    pub language_hints: Vec<String>,

    /// Use semantic rather than silence-based sentence segmentation.
    pub semantic_punctuation_enabled: bool,

    /// Silence (ms) that closes a sentence. Valid range 200–6000.
    pub max_sentence_silence: u32,

    /// Insert punctuation.
    pub punctuation_prediction_enabled: bool,

    /// Keep the task alive through long silences.
    pub heartbeat: bool,

    /// Normalise numbers, dates, etc.
    pub inverse_text_normalization_enabled: bool,

    /// What `submit_audio` does when no task is active.
    pub reconnect: ReconnectPolicy,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            model: "paraformer-realtime-v2".to_string(),
            sample_rate: 16_000,
            format: "wav".to_string(),
            vocabulary_id: None,
            phrase_id: None,
            disfluency_removal_enabled: false,
            language_hints: vec!["zh".to_string(), "en".to_string()],
            semantic_punctuation_enabled: false,
            max_sentence_silence: 800,
            punctuation_prediction_enabled: true,
            heartbeat: false,
            inverse_text_normalization_enabled: true,
            reconnect: ReconnectPolicy::OnDemand,
        }
    }
}

impl AsrConfig {
    /// Build the `parameters` object of the `run-task` message.
    ///
    /// Optional hint ids are only included when set.
    pub fn parameters(&self) -> Value {
        let mut params = json!({
            "sample_rate": self.sample_rate,
            "format": self.format,
            "disfluency_removal_enabled": self.disfluency_removal_enabled,
            "language_hints": self.language_hints,
            "semantic_punctuation_enabled": self.semantic_punctuation_enabled,
            "max_sentence_silence": self.max_sentence_silence,
            "punctuation_prediction_enabled": self.punctuation_prediction_enabled,
            "heartbeat": self.heartbeat,
            "inverse_text_normalization_enabled": self.inverse_text_normalization_enabled,
        });
        if let Some(id) = &self.vocabulary_id {
            params["vocabulary_id"] = json!(id);
        }
        if let Some(id) = &self.phrase_id {
            params["phrase_id"] = json!(id);
        }
        params
    }

    /// Validate ranges before a task is started.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RealtimeError::Config("recognition model cannot be empty".into()));
        }
        if self.sample_rate == 0 {
            return Err(RealtimeError::Config("sample rate must be positive".into()));
        }
        if !(200..=6000).contains(&self.max_sentence_silence) {
            return Err(RealtimeError::Config(format!(
                "max_sentence_silence must be between 200 and 6000 ms, got {}",
                self.max_sentence_silence
            )));
        }
        Ok(())
    }
}

// ── Synthesis ──────────────────────────────────────────────────────

/// Synthesis (TTS) task configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesis model.
    pub model: String,

    /// Voice id.
    pub voice: String,

    /// Volume, 0–100.
    pub volume: u32,

    /// Speech rate multiplier, 0.5–2.0.
    pub speech_rate: f32,

    /// Pitch multiplier, 0.5–2.0.
    pub pitch_rate: f32,

    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Output encoding (`pcm`, `wav`, `mp3`).
    pub format: String,

    /// What `submit_text` does when no task is active.
    pub reconnect: ReconnectPolicy,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: "cosyvoice-v1".to_string(),
            voice: "longxiaoxia".to_string(),
            volume: 80,
            speech_rate: 1.0,
            pitch_rate: 1.0,
            sample_rate: 22_050,
            format: "pcm".to_string(),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl TtsConfig {
    /// Build the `parameters` object of the `run-task` message.
    pub fn parameters(&self) -> Value {
        json!({
            "text_type": "PlainText",
            "voice": self.voice,
            "format": self.format,
            "sample_rate": self.sample_rate,
            "volume": self.volume,
            "rate": self.speech_rate,
            "pitch": self.pitch_rate,
        })
    }

    /// Validate ranges before a task is started.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.voice.trim().is_empty() {
            return Err(RealtimeError::Config(
                "synthesis model and voice cannot be empty".into(),
            ));
        }
        if self.volume > 100 {
            return Err(RealtimeError::Config(format!(
                "volume must be between 0 and 100, got {}",
                self.volume
            )));
        }
        for (name, value) in [("rate", self.speech_rate), ("pitch", self.pitch_rate)] {
            if !(0.5..=2.0).contains(&value) {
                return Err(RealtimeError::Config(format!(
                    "{name} must be between 0.5 and 2.0, got {value}"
                )));
            }
        }
        if self.sample_rate == 0 {
            return Err(RealtimeError::Config("sample rate must be positive".into()));
        }
        Ok(())
    }
}
