//! `speak` command handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use dashscope_core::{ChannelSink, ConnectionConfig, RealtimeEvent};
use dashscope_voice::{FileSink, SynthesisPipeline, WsConnector};

use crate::commands::SpeakArgs;
use crate::config::tts_config;
use crate::error::CliError;

/// Synthesize each text argument in order and write the audio to `--output`.
pub async fn execute(connection: ConnectionConfig, args: SpeakArgs) -> Result<()> {
    if args.text.iter().all(|text| text.trim().is_empty()) {
        return Err(CliError::Arguments("nothing to say".into()).into());
    }

    let start_timeout = connection.start_timeout;
    let connector = Arc::new(WsConnector::new(connection)?);
    let output = Arc::new(FileSink::create(args.output.clone()).await?);
    let (sink, mut events) = ChannelSink::new();
    let pipeline = SynthesisPipeline::new(
        connector,
        tts_config(&args),
        output.clone(),
        Arc::new(sink),
    )
    .with_start_timeout(start_timeout);

    let counter = tokio::spawn(async move {
        let mut bytes = 0_usize;
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::AudioChunk { audio, .. } => bytes += audio.len(),
                RealtimeEvent::Failed { message, .. } => eprintln!("✗ {message}"),
                _ => {}
            }
        }
        bytes
    });

    let task_id = pipeline.start().await?;
    info!(%task_id, increments = args.text.len(), "Synthesizing");
    let result = async {
        for text in &args.text {
            pipeline.submit_text(text.clone()).await?;
        }
        pipeline
            .request_finish(Some(Duration::from_secs(args.timeout_secs)))
            .await
    }
    .await;
    pipeline.close().await;
    drop(pipeline);

    let bytes = counter.await?;
    result?;
    println!("✓ Wrote {bytes} bytes of audio to {}", output.path().display());
    Ok(())
}
