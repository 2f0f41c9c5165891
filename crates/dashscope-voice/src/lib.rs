//! Realtime speech pipelines for DashScope.
//!
//! - [`RecognitionPipeline`] streams audio in and emits transcripts.
//! - [`SynthesisPipeline`] streams text in and delivers audio to an
//!   [`AudioSink`](dashscope_core::AudioSink) at the sink's own pace, with
//!   interrupt-and-restart.
//! - [`RealtimeClient`] combines both behind one typed handler table.
//! - [`WsConnector`] is the production transport; tests plug in their own
//!   [`Connector`](dashscope_core::Connector).

#![deny(unused_crate_dependencies)]

pub mod audio_io;
pub mod client;
pub mod recognition;
mod session;
pub mod synthesis;
pub mod ws;

pub use audio_io::{ChunkedFileSource, DEFAULT_CHUNK_SIZE, DEFAULT_PACE, FileSink};
pub use client::{ClientEvent, ClientEventKind, RealtimeClient};
pub use recognition::RecognitionPipeline;
pub use synthesis::{Interruption, SynthesisPipeline};
pub use ws::WsConnector;

// Only used by the integration tests
#[cfg(test)]
use serde_json as _;
#[cfg(test)]
use tokio_test as _;
