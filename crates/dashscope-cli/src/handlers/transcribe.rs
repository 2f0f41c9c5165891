//! `transcribe` command handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use dashscope_core::{ChannelSink, ConnectionConfig, RealtimeEvent};
use dashscope_voice::{ChunkedFileSource, RecognitionPipeline, WsConnector};

use crate::commands::TranscribeArgs;
use crate::config::{asr_config, pace};

/// Stream `args.file` to the recognizer and print transcripts as they come.
pub async fn execute(connection: ConnectionConfig, args: TranscribeArgs) -> Result<()> {
    let start_timeout = connection.start_timeout;
    let connector = Arc::new(WsConnector::new(connection)?);
    let (sink, mut events) = ChannelSink::new();
    let pipeline = RecognitionPipeline::new(connector, asr_config(&args), Arc::new(sink))
        .with_start_timeout(start_timeout);

    let mut source = ChunkedFileSource::open(&args.file)
        .await?
        .with_chunk_size(args.chunk_size)
        .with_pace(pace(args.pace_ms));

    let printer = tokio::spawn(async move {
        let mut sentences = 0_usize;
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::Partial { text, .. } => println!("  … {text}"),
                RealtimeEvent::SentenceEnd { text, .. } => {
                    sentences += 1;
                    println!("✓ {text}");
                }
                RealtimeEvent::Failed { message, .. } => eprintln!("✗ {message}"),
                _ => {}
            }
        }
        sentences
    });

    let task_id = pipeline.connect().await?;
    info!(%task_id, file = %args.file.display(), "Transcribing");
    let result = async {
        let sent = pipeline.stream_from(&mut source).await?;
        pipeline
            .request_finish(Some(Duration::from_secs(args.timeout_secs)))
            .await?;
        Ok::<_, anyhow::Error>(sent)
    }
    .await;
    pipeline.close().await;
    // Releases the last event sender so the printer drains and exits.
    drop(pipeline);

    let sentences = printer.await?;
    let sent = result?;
    println!();
    println!(
        "Sent {sent} bytes in {} chunks, {sentences} sentence(s) recognized.",
        source.chunks_emitted()
    );
    Ok(())
}
