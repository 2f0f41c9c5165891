//! Audio I/O ports.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Supplies recognition audio, chunk by chunk.
#[async_trait]
pub trait AudioSource: Send {
    /// Next chunk, or `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Consumes synthesized audio at its own pace.
///
/// The delivery task awaits each `push` before pulling the next frame, so a
/// slow sink applies back-pressure to delivery (but never to the network
/// receive loop).
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn push(&self, audio: Bytes) -> Result<()>;

    /// Called once after the last chunk of a finished task.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}
