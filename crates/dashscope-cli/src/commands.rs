//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use dashscope_voice::DEFAULT_CHUNK_SIZE;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream an audio file to the recognizer and print transcripts
    Transcribe(TranscribeArgs),

    /// Synthesize text and write the audio to a file
    Speak(SpeakArgs),

    /// Show the effective configuration (API key redacted)
    Config,
}

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    /// Audio file to stream
    pub file: PathBuf,

    /// Bytes per audio frame
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Delay between frames in milliseconds (0 streams as fast as possible)
    #[arg(long, default_value_t = 100)]
    pub pace_ms: u64,

    /// How long to wait for the final transcript after the file is sent
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Recognition model
    #[arg(long)]
    pub model: Option<String>,

    /// Input sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Input encoding (pcm, wav, mp3, ...)
    #[arg(long)]
    pub format: Option<String>,

    /// Language hint; repeat for several
    #[arg(long = "language-hint")]
    pub language_hints: Vec<String>,

    /// Silence in milliseconds that closes a sentence (200-6000)
    #[arg(long)]
    pub max_sentence_silence: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SpeakArgs {
    /// Text to synthesize; each argument is sent as a separate increment
    #[arg(required = true)]
    pub text: Vec<String>,

    /// Where to write the synthesized audio
    #[arg(short, long)]
    pub output: PathBuf,

    /// Voice id
    #[arg(long)]
    pub voice: Option<String>,

    /// Synthesis model
    #[arg(long)]
    pub model: Option<String>,

    /// Output sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Output encoding (pcm, wav, mp3)
    #[arg(long)]
    pub format: Option<String>,

    /// Volume (0-100)
    #[arg(long)]
    pub volume: Option<u32>,

    /// Speech rate multiplier (0.5-2.0)
    #[arg(long)]
    pub rate: Option<f32>,

    /// Pitch multiplier (0.5-2.0)
    #[arg(long)]
    pub pitch: Option<f32>,

    /// How long to wait for synthesis to complete
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}
