//! File-backed [`AudioSource`] and [`AudioSink`] adapters.
//!
//! | Adapter | Used by |
//! |---|---|
//! | [`ChunkedFileSource`] | `dashscope transcribe` - replays a recording as if captured live |
//! | [`FileSink`] | `dashscope speak` - writes synthesized audio to disk |

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use dashscope_core::{AudioSink, AudioSource, RealtimeError, Result};

/// 100 ms of 16 kHz 16-bit mono PCM.
pub const DEFAULT_CHUNK_SIZE: usize = 3200;

/// Delay between chunks when emulating a live microphone.
pub const DEFAULT_PACE: Duration = Duration::from_millis(100);

/// Reads a file in fixed-size chunks, optionally paced in real time.
#[derive(Debug)]
pub struct ChunkedFileSource {
    file: File,
    chunk_size: usize,
    pace: Option<Duration>,
    emitted: u64,
}

impl ChunkedFileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| RealtimeError::Audio(format!("{}: {e}", path.display())))?;
        Ok(Self {
            file,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pace: Some(DEFAULT_PACE),
            emitted: 0,
        })
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// `None` reads as fast as the consumer pulls.
    #[must_use]
    pub const fn with_pace(mut self, pace: Option<Duration>) -> Self {
        self.pace = pace;
        self
    }

    /// Chunks returned so far.
    pub const fn chunks_emitted(&self) -> u64 {
        self.emitted
    }
}

#[async_trait]
impl AudioSource for ChunkedFileSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.emitted > 0 {
            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }
        }

        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;
        while filled < self.chunk_size {
            let read = self.file.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.emitted += 1;
        Ok(Some(buf.freeze()))
    }
}

/// Appends every pushed chunk to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create (or truncate) the output file.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| RealtimeError::Audio(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn push(&self, audio: Bytes) -> Result<()> {
        self.file.lock().await.write_all(&audio).await?;
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        self.file.lock().await.flush().await?;
        debug!(path = %self.path.display(), "Audio file flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_splits_file_into_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.pcm");
        tokio::fs::write(&path, vec![7_u8; 7000]).await.unwrap();

        let mut source = ChunkedFileSource::open(&path)
            .await
            .unwrap()
            .with_pace(None);
        let mut sizes = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }

        assert_eq!(sizes, vec![3200, 3200, 600]);
        assert_eq!(source.chunks_emitted(), 3);
    }

    #[tokio::test]
    async fn empty_file_yields_nothing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut source = ChunkedFileSource::open(file.path())
            .await
            .unwrap()
            .with_chunk_size(0);
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_audio_error() {
        let err = ChunkedFileSource::open("/nonexistent/input.pcm")
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Audio(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn paced_source_waits_between_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.pcm");
        tokio::fs::write(&path, vec![0_u8; 64]).await.unwrap();

        let mut source = ChunkedFileSource::open(&path)
            .await
            .unwrap()
            .with_chunk_size(16);
        let started = tokio::time::Instant::now();
        while source.next_chunk().await.unwrap().is_some() {}

        // Four chunks, then the empty read: four pauses after the first.
        assert_eq!(started.elapsed(), DEFAULT_PACE * 4);
    }

    #[tokio::test]
    async fn sink_writes_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcm");
        let sink = FileSink::create(&path).await.unwrap();

        sink.push(Bytes::from_static(b"ab")).await.unwrap();
        sink.push(Bytes::from_static(b"cd")).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.path(), path.as_path());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcd");
    }
}
