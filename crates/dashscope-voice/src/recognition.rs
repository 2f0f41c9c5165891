//! Ingress pipeline: stream microphone or file audio into a recognition task.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info};

use dashscope_core::protocol::Sentence;
use dashscope_core::{
    AsrConfig, AudioSource, Connector, EventSink, RealtimeError, RealtimeEvent, ReconnectPolicy,
    Result, Task, TaskDirection, TaskId,
};

use crate::session::{InboundRouter, Session, with_deadline};

/// Streams audio to a recognition task and surfaces transcripts as events.
///
/// Events per task, in order: `Started`, any number of `Partial` (each
/// followed by `SentenceEnd` when the sentence closed), then exactly one of
/// `Finished` / `Failed`.
pub struct RecognitionPipeline {
    connector: Arc<dyn Connector>,
    config: AsrConfig,
    events: Arc<dyn EventSink>,
    start_timeout: Option<Duration>,
    session: Mutex<Option<Session>>,
}

impl RecognitionPipeline {
    pub fn new(connector: Arc<dyn Connector>, config: AsrConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            connector,
            config,
            events,
            start_timeout: None,
            session: Mutex::new(None),
        }
    }

    /// Wait for `task-started` (bounded) whenever a session is opened.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub const fn config(&self) -> &AsrConfig {
        &self.config
    }

    /// Open a session and start a task unless one is already active.
    pub async fn connect(&self) -> Result<TaskId> {
        self.config.validate()?;
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref().filter(|s| s.task().is_active()) {
            return Ok(session.task().id().clone());
        }
        self.open_locked(&mut guard).await
    }

    async fn open_locked(&self, slot: &mut Option<Session>) -> Result<TaskId> {
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        let task = Arc::new(Task::new(
            TaskDirection::Recognition,
            self.config.model.clone(),
            self.config.parameters(),
        ));
        let router = Arc::new(RecognitionRouter {
            events: Arc::clone(&self.events),
        });
        let session =
            Session::open(self.connector.as_ref(), task, router, self.start_timeout).await?;
        let task_id = session.task().id().clone();
        *slot = Some(session);
        Ok(task_id)
    }

    /// Forward one chunk of raw audio.
    ///
    /// With [`ReconnectPolicy::OnDemand`], a missing or terminal session is
    /// replaced by a fresh one first.
    pub async fn submit_audio(&self, audio: Bytes) -> Result<()> {
        let mut guard = self.session.lock().await;
        let needs_session = guard.as_ref().is_none_or(|s| s.task().is_terminal());
        if needs_session {
            match self.config.reconnect {
                ReconnectPolicy::OnDemand => {
                    debug!("Opening recognition session on demand");
                    self.open_locked(&mut guard).await?;
                }
                ReconnectPolicy::Never => {
                    let state = guard
                        .as_ref()
                        .map_or("closed", |s| s.task().state().label());
                    return Err(RealtimeError::invalid_state("submit_audio", state));
                }
            }
        }

        let session = guard
            .as_ref()
            .ok_or_else(|| RealtimeError::invalid_state("submit_audio", "closed"))?;
        session.task().ensure_accepts_input("submit_audio")?;
        session.send_audio(audio).await
    }

    /// Send `finish-task` and wait until the task is terminal.
    ///
    /// Every `SentenceEnd` for the task has been emitted when this returns
    /// `Ok`. On deadline expiry the task stays `Finishing`.
    pub async fn request_finish(&self, deadline: Option<Duration>) -> Result<()> {
        let (task, settled) = {
            let guard = self.session.lock().await;
            let session = guard
                .as_ref()
                .ok_or_else(|| RealtimeError::invalid_state("request_finish", "closed"))?;
            session.finish().await?;
            (Arc::clone(session.task()), session.settled())
        };

        with_deadline(deadline, async move {
            let outcome = task.wait_terminal(None).await;
            settled.cancelled().await;
            outcome
        })
        .await
    }

    /// Pull chunks from `source` until it is exhausted, submitting each.
    ///
    /// Returns the number of bytes sent.
    pub async fn stream_from(&self, source: &mut dyn AudioSource) -> Result<u64> {
        let mut sent = 0_u64;
        while let Some(chunk) = source.next_chunk().await? {
            let len = chunk.len() as u64;
            self.submit_audio(chunk).await?;
            sent += len;
        }
        info!(bytes = sent, "Audio source exhausted");
        Ok(sent)
    }

    /// Close the session. A task still running is dropped without events.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.close().await;
        }
    }

    pub async fn is_active(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.task().is_active())
    }

    pub async fn task_id(&self) -> Option<TaskId> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.task().id().clone())
    }
}

struct RecognitionRouter {
    events: Arc<dyn EventSink>,
}

impl InboundRouter for RecognitionRouter {
    fn on_started(&self, task: &Task) {
        self.events.emit(RealtimeEvent::Started {
            task_id: task.id().clone(),
        });
    }

    fn on_result(&self, task: &Task, sentence: &Sentence) {
        self.events.emit(RealtimeEvent::Partial {
            task_id: task.id().clone(),
            text: sentence.text.clone(),
        });
        if sentence.is_end() {
            debug!(task_id = %task.id(), text = %sentence.text, "Sentence end");
            self.events.emit(RealtimeEvent::SentenceEnd {
                task_id: task.id().clone(),
                text: sentence.text.clone(),
            });
        }
    }

    fn on_finished(&self, task: &Task) {
        self.events.emit(RealtimeEvent::Finished {
            task_id: task.id().clone(),
        });
    }

    fn on_failed(&self, task: &Task, message: &str) {
        self.events.emit(RealtimeEvent::Failed {
            task_id: task.id().clone(),
            message: message.to_string(),
        });
    }
}
