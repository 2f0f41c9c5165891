//! Combined full-duplex client: one recognition and one synthesis pipeline
//! behind a single typed event table.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::info;

use dashscope_core::{
    AsrConfig, AudioSink, Connector, Dispatch, EventSink, HandlerTable, RealtimeEvent, Result,
    TaskId, TtsConfig,
};

use crate::recognition::RecognitionPipeline;
use crate::synthesis::{Interruption, SynthesisPipeline};

/// Events surfaced by [`RealtimeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Both directions are connected.
    Ready,
    AsrPartial { text: String },
    AsrSentenceEnd { text: String },
    AsrFinished,
    /// One delivered synthesis frame.
    TtsAudio(Bytes),
    TtsEnd,
    /// Synthesis was interrupted and restarted under a new task id.
    Interrupted {
        abandoned: Option<TaskId>,
        replacement: TaskId,
    },
    /// Either direction failed.
    Error { message: String },
}

/// Discriminant of [`ClientEvent`], used as a handler-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    Ready,
    AsrPartial,
    AsrSentenceEnd,
    AsrFinished,
    TtsAudio,
    TtsEnd,
    Interrupted,
    Error,
}

impl Dispatch for ClientEvent {
    type Kind = ClientEventKind;

    fn kind(&self) -> ClientEventKind {
        match self {
            Self::Ready => ClientEventKind::Ready,
            Self::AsrPartial { .. } => ClientEventKind::AsrPartial,
            Self::AsrSentenceEnd { .. } => ClientEventKind::AsrSentenceEnd,
            Self::AsrFinished => ClientEventKind::AsrFinished,
            Self::TtsAudio(_) => ClientEventKind::TtsAudio,
            Self::TtsEnd => ClientEventKind::TtsEnd,
            Self::Interrupted { .. } => ClientEventKind::Interrupted,
            Self::Error { .. } => ClientEventKind::Error,
        }
    }
}

/// Maps one pipeline's events onto [`ClientEvent`]s.
struct Bridge {
    handlers: Arc<HandlerTable<ClientEvent>>,
    synthesis: bool,
}

impl EventSink for Bridge {
    fn emit(&self, event: RealtimeEvent) {
        let mapped = match event {
            RealtimeEvent::Started { .. } => return,
            RealtimeEvent::Partial { text, .. } => ClientEvent::AsrPartial { text },
            RealtimeEvent::SentenceEnd { text, .. } => ClientEvent::AsrSentenceEnd { text },
            RealtimeEvent::AudioChunk { audio, .. } => ClientEvent::TtsAudio(audio),
            RealtimeEvent::Finished { .. } if self.synthesis => ClientEvent::TtsEnd,
            RealtimeEvent::Finished { .. } => ClientEvent::AsrFinished,
            RealtimeEvent::Failed { message, .. } => ClientEvent::Error { message },
        };
        self.handlers.dispatch(&mapped);
    }
}

/// Full-duplex speech client.
///
/// Handlers registered with [`on`](Self::on) run in registration order on
/// the pipeline task that produced the event; keep them short.
pub struct RealtimeClient {
    recognition: RecognitionPipeline,
    synthesis: SynthesisPipeline,
    handlers: Arc<HandlerTable<ClientEvent>>,
    started: Mutex<bool>,
}

impl RealtimeClient {
    /// Build a client whose synthesized audio goes to `player`.
    pub fn new(
        connector: Arc<dyn Connector>,
        asr: AsrConfig,
        tts: TtsConfig,
        player: Arc<dyn AudioSink>,
    ) -> Self {
        let handlers = Arc::new(HandlerTable::new());
        let recognition = RecognitionPipeline::new(
            Arc::clone(&connector),
            asr,
            Arc::new(Bridge {
                handlers: Arc::clone(&handlers),
                synthesis: false,
            }),
        );
        let synthesis = SynthesisPipeline::new(
            connector,
            tts,
            player,
            Arc::new(Bridge {
                handlers: Arc::clone(&handlers),
                synthesis: true,
            }),
        );
        Self {
            recognition,
            synthesis,
            handlers,
            started: Mutex::new(false),
        }
    }

    /// Wait for `task-started` in both directions when connecting.
    #[must_use]
    pub fn with_start_timeout(self, timeout: Option<Duration>) -> Self {
        Self {
            recognition: self.recognition.with_start_timeout(timeout),
            synthesis: self.synthesis.with_start_timeout(timeout),
            ..self
        }
    }

    pub fn on<F>(&self, kind: ClientEventKind, handler: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.handlers.on(kind, handler);
    }

    /// Resolve with the next event of `kind`. Registered immediately.
    pub fn wait_for(
        &self,
        kind: ClientEventKind,
    ) -> impl Future<Output = Result<ClientEvent>> + Send + use<> {
        self.handlers.wait_for(kind)
    }

    /// Connect both directions and emit [`ClientEvent::Ready`].
    ///
    /// Serialised: concurrent callers wait, and a started client is left
    /// as is.
    pub async fn start(&self) -> Result<()> {
        let mut started = self.started.lock().await;
        if *started {
            return Ok(());
        }
        self.recognition.connect().await?;
        if let Err(err) = self.synthesis.start().await {
            self.recognition.close().await;
            return Err(err);
        }
        *started = true;
        drop(started);

        info!("Realtime client ready");
        self.handlers.dispatch(&ClientEvent::Ready);
        Ok(())
    }

    /// Close both directions concurrently.
    pub async fn stop(&self) {
        let mut started = self.started.lock().await;
        tokio::join!(self.recognition.close(), self.synthesis.close());
        *started = false;
        info!("Realtime client stopped");
    }

    pub async fn send_audio_chunk(&self, audio: Bytes) -> Result<()> {
        self.recognition.submit_audio(audio).await
    }

    pub async fn say(&self, text: impl Into<String>) -> Result<()> {
        self.synthesis.submit_text(text).await
    }

    pub async fn finish_listening(&self, deadline: Option<Duration>) -> Result<()> {
        self.recognition.request_finish(deadline).await
    }

    pub async fn finish_speaking(&self, deadline: Option<Duration>) -> Result<()> {
        self.synthesis.request_finish(deadline).await
    }

    /// Cut synthesis off and start a fresh synthesis task.
    pub async fn interrupt(&self) -> Result<TaskId> {
        let Interruption {
            abandoned,
            replacement,
        } = self.synthesis.interrupt_detailed().await?;
        self.handlers.dispatch(&ClientEvent::Interrupted {
            abandoned,
            replacement: replacement.clone(),
        });
        Ok(replacement)
    }

    pub const fn recognition(&self) -> &RecognitionPipeline {
        &self.recognition
    }

    pub const fn synthesis(&self) -> &SynthesisPipeline {
        &self.synthesis
    }
}
