//! Assemble pipeline configuration from flags and the environment.
//!
//! Flags only override what they name; everything else keeps the
//! library defaults.

use std::time::Duration;

use dashscope_core::{AsrConfig, ConnectionConfig, RealtimeError, TtsConfig};

use crate::commands::{SpeakArgs, TranscribeArgs};

/// Connection settings from `DASHSCOPE_API_KEY`, with `--url` applied.
pub fn connection_config(url: Option<&str>) -> Result<ConnectionConfig, RealtimeError> {
    connection_config_from(url, |key| std::env::var(key).ok())
}

/// [`connection_config`] with an injectable environment lookup.
pub fn connection_config_from(
    url: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConnectionConfig, RealtimeError> {
    let mut config = ConnectionConfig::from_lookup(lookup)?;
    if let Some(url) = url {
        config = config.with_url(url);
        config.validate()?;
    }
    Ok(config)
}

pub fn asr_config(args: &TranscribeArgs) -> AsrConfig {
    let mut config = AsrConfig::default();
    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(format) = &args.format {
        config.format.clone_from(format);
    }
    if !args.language_hints.is_empty() {
        config.language_hints.clone_from(&args.language_hints);
    }
    if let Some(silence) = args.max_sentence_silence {
        config.max_sentence_silence = silence;
    }
    config
}

pub fn tts_config(args: &SpeakArgs) -> TtsConfig {
    let mut config = TtsConfig::default();
    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(voice) = &args.voice {
        config.voice.clone_from(voice);
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(format) = &args.format {
        config.format.clone_from(format);
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if let Some(rate) = args.rate {
        config.speech_rate = rate;
    }
    if let Some(pitch) = args.pitch {
        config.pitch_rate = pitch;
    }
    config
}

/// `0` disables pacing.
pub const fn pace(pace_ms: u64) -> Option<Duration> {
    if pace_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(pace_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use dashscope_core::{API_KEY_ENV, DEFAULT_WS_URL};

    fn key_only(key: &str) -> Option<String> {
        (key == API_KEY_ENV).then(|| "sk-test-5678".to_string())
    }

    #[test]
    fn url_flag_overrides_default_endpoint() {
        let config = connection_config_from(Some("ws://127.0.0.1:9000/ws"), key_only).unwrap();
        assert_eq!(config.url, "ws://127.0.0.1:9000/ws");

        let config = connection_config_from(None, key_only).unwrap();
        assert_eq!(config.url, DEFAULT_WS_URL);
    }

    #[test]
    fn url_flag_is_validated() {
        let err = connection_config_from(Some("http://example.com"), key_only).unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = connection_config_from(None, |_| None).unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
    }

    #[test]
    fn transcribe_flags_override_only_what_they_name() {
        let cli = Cli::parse_from([
            "dashscope",
            "transcribe",
            "a.pcm",
            "--format",
            "pcm",
            "--language-hint",
            "ja",
        ]);
        let Some(Commands::Transcribe(args)) = cli.command else {
            panic!("expected transcribe");
        };
        let config = asr_config(&args);
        assert_eq!(config.format, "pcm");
        assert_eq!(config.language_hints, vec!["ja"]);
        assert_eq!(config.sample_rate, AsrConfig::default().sample_rate);
        assert_eq!(config.model, AsrConfig::default().model);
    }

    #[test]
    fn speak_flags_map_to_synthesis_parameters() {
        let cli = Cli::parse_from([
            "dashscope",
            "speak",
            "hi",
            "-o",
            "out.pcm",
            "--voice",
            "longwan",
            "--volume",
            "50",
            "--pitch",
            "0.8",
        ]);
        let Some(Commands::Speak(args)) = cli.command else {
            panic!("expected speak");
        };
        let params = tts_config(&args).parameters();
        assert_eq!(params["voice"], "longwan");
        assert_eq!(params["volume"], 50);
        assert_eq!(params["rate"], 1.0);
    }

    #[test]
    fn zero_pace_streams_unpaced() {
        assert_eq!(pace(0), None);
        assert_eq!(pace(40), Some(Duration::from_millis(40)));
    }
}
