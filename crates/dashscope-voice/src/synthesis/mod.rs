//! Egress pipeline: stream text into a synthesis task and relay its audio.
//!
//! # Concurrency
//!
//! Each generation (one session, one task) runs two background tasks: the
//! session's receive loop, which enqueues audio without waiting for the
//! consumer, and a delivery task, which pulls the queue and awaits the
//! consumer for each frame. All pipeline operations take the submission
//! gate, so text fragments from concurrent callers never interleave and an
//! interrupt never races a submission.
//!
//! # Interrupt
//!
//! [`SynthesisPipeline::interrupt`] abandons the current task (late frames
//! are discarded from then on), stops delivery with queued frames dropped,
//! closes the channel and starts a replacement task on a fresh channel with
//! a fresh queue.

mod delivery;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::{debug, info, warn};

use dashscope_core::{
    AudioSink, Connector, EventSink, OutboundMessage, RealtimeError, RealtimeEvent,
    ReconnectPolicy, Result, Task, TaskDirection, TaskId, TtsConfig,
};

use crate::session::{InboundRouter, Session, with_deadline};
use delivery::{Delivery, EmitGate, QueueItem, QueueReceiver, QueueSender};

/// Streams text to a synthesis task and delivers the audio to a consumer.
///
/// Events per task, in order: `Started`, one `AudioChunk` per delivered
/// frame, then exactly one of `Finished` / `Failed`. An interrupted task
/// ends without a terminal event.
pub struct SynthesisPipeline {
    connector: Arc<dyn Connector>,
    config: TtsConfig,
    consumer: Arc<dyn AudioSink>,
    events: Arc<dyn EventSink>,
    start_timeout: Option<Duration>,
    gate: Mutex<Option<Generation>>,
    live_deliveries: Arc<AtomicUsize>,
}

/// Outcome of [`SynthesisPipeline::interrupt_detailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    /// The task that was cut off, if one was open.
    pub abandoned: Option<TaskId>,
    /// The fresh task now accepting text.
    pub replacement: TaskId,
}

/// Everything that belongs to one task.
struct Generation {
    session: Session,
    events: Arc<EmitGate>,
    /// Taken when the delivery task is spawned.
    queue: Option<QueueReceiver>,
    delivery: Option<Delivery>,
}

impl Generation {
    /// Stop delivery (dropping queued frames) and close the channel.
    async fn shut_down(mut self) {
        if let Some(delivery) = self.delivery.take() {
            delivery.stop().await;
        }
        self.session.close().await;
    }
}

impl SynthesisPipeline {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: TtsConfig,
        consumer: Arc<dyn AudioSink>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connector,
            config,
            consumer,
            events,
            start_timeout: None,
            gate: Mutex::new(None),
            live_deliveries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for `task-started` (bounded) whenever a session is opened.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub const fn config(&self) -> &TtsConfig {
        &self.config
    }

    /// Open a session with a fresh task unless one is already active, and
    /// spawn its delivery task.
    pub async fn start(&self) -> Result<TaskId> {
        self.config.validate()?;
        let mut gate = self.gate.lock().await;
        if gate
            .as_ref()
            .is_none_or(|generation| generation.session.task().is_terminal())
        {
            self.open_locked(&mut gate).await?;
        }
        self.active_generation(&mut gate, "start")
    }

    /// Replace the current generation (if any) with a new session and task.
    async fn open_locked(&self, gate: &mut MutexGuard<'_, Option<Generation>>) -> Result<TaskId> {
        if let Some(previous) = gate.take() {
            previous.shut_down().await;
        }

        let task = Arc::new(Task::new(
            TaskDirection::Synthesis,
            self.config.model.clone(),
            self.config.parameters(),
        ));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let events = Arc::new(EmitGate::new(Arc::clone(&self.events)));
        let router = Arc::new(SynthesisRouter {
            queue: queue_tx,
            events: Arc::clone(&events),
        });
        let session =
            Session::open(self.connector.as_ref(), task, router, self.start_timeout).await?;
        let task_id = session.task().id().clone();
        **gate = Some(Generation {
            session,
            events,
            queue: Some(queue_rx),
            delivery: None,
        });
        Ok(task_id)
    }

    /// Spawn the delivery task for the current generation if needed and
    /// return its task id.
    fn active_generation(
        &self,
        gate: &mut MutexGuard<'_, Option<Generation>>,
        operation: &'static str,
    ) -> Result<TaskId> {
        let generation = gate
            .as_mut()
            .ok_or_else(|| RealtimeError::invalid_state(operation, "closed"))?;
        if let Some(queue) = generation.queue.take() {
            generation.delivery = Some(Delivery::spawn(
                Arc::clone(generation.session.task()),
                queue,
                Arc::clone(&self.consumer),
                Arc::clone(&generation.events),
                Arc::clone(&self.live_deliveries),
            ));
        }
        Ok(generation.session.task().id().clone())
    }

    /// Send one text increment.
    ///
    /// The first submission of a task spawns its delivery task. With
    /// [`ReconnectPolicy::OnDemand`], a missing or terminal task is replaced
    /// by a fresh one first.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let mut gate = self.gate.lock().await;
        let needs_session = gate
            .as_ref()
            .is_none_or(|generation| generation.session.task().is_terminal());
        if needs_session {
            match self.config.reconnect {
                ReconnectPolicy::OnDemand => {
                    debug!("Opening synthesis session on demand");
                    self.open_locked(&mut gate).await?;
                }
                ReconnectPolicy::Never => {
                    let state = gate.as_ref().map_or("closed", |generation| {
                        generation.session.task().state().label()
                    });
                    return Err(RealtimeError::invalid_state("submit_text", state));
                }
            }
        }

        let task_id = self.active_generation(&mut gate, "submit_text")?;
        let generation = gate
            .as_ref()
            .ok_or_else(|| RealtimeError::invalid_state("submit_text", "closed"))?;
        generation.session.task().ensure_accepts_input("submit_text")?;

        debug!(%task_id, chars = text.chars().count(), "Submitting text");
        let message = OutboundMessage::continue_text(&task_id, text).encode()?;
        generation.session.send_text(message).await
    }

    /// Send `finish-task` (once) and wait until the task is terminal and all
    /// queued audio has been delivered.
    ///
    /// On deadline expiry the task stays `Finishing` and delivery continues.
    pub async fn request_finish(&self, deadline: Option<Duration>) -> Result<()> {
        let (task, settled, stopped) = {
            let mut gate = self.gate.lock().await;
            self.active_generation(&mut gate, "request_finish")?;
            let generation = gate
                .as_ref()
                .ok_or_else(|| RealtimeError::invalid_state("request_finish", "closed"))?;
            generation.session.finish().await?;
            (
                Arc::clone(generation.session.task()),
                generation.session.settled(),
                generation.delivery.as_ref().map(Delivery::stopped),
            )
        };

        with_deadline(deadline, async move {
            let outcome = task.wait_terminal(None).await;
            settled.cancelled().await;
            if let Some(stopped) = stopped {
                stopped.cancelled().await;
            }
            outcome
        })
        .await
    }

    /// Abandon the current task and start a replacement.
    ///
    /// On return no further audio of the abandoned task reaches the
    /// consumer, no background task of it is alive, and the replacement
    /// task accepts [`submit_text`](Self::submit_text) immediately.
    pub async fn interrupt(&self) -> Result<TaskId> {
        Ok(self.interrupt_detailed().await?.replacement)
    }

    /// [`interrupt`](Self::interrupt), also reporting which task was
    /// abandoned. Both ids are read under the same gate acquisition.
    pub async fn interrupt_detailed(&self) -> Result<Interruption> {
        let mut gate = self.gate.lock().await;
        let mut abandoned = None;
        if let Some(mut generation) = gate.take() {
            let task_id = generation.session.task().id().clone();
            generation.session.task().abandon();
            if let Some(delivery) = generation.delivery.take() {
                delivery.stop().await;
            }
            generation.session.close().await;
            info!(%task_id, "Task interrupted");
            abandoned = Some(task_id);
        }
        let replacement = self.open_locked(&mut gate).await?;
        Ok(Interruption {
            abandoned,
            replacement,
        })
    }

    /// Stop delivery and close the session. An active task is dropped
    /// without events.
    pub async fn close(&self) {
        let generation = self.gate.lock().await.take();
        if let Some(generation) = generation {
            generation.shut_down().await;
        }
    }

    /// Number of delivery tasks currently alive (0 or 1).
    pub fn live_deliveries(&self) -> usize {
        self.live_deliveries.load(Ordering::SeqCst)
    }

    pub async fn is_active(&self) -> bool {
        self.gate
            .lock()
            .await
            .as_ref()
            .is_some_and(|generation| generation.session.task().is_active())
    }

    pub async fn task_id(&self) -> Option<TaskId> {
        self.gate
            .lock()
            .await
            .as_ref()
            .map(|generation| generation.session.task().id().clone())
    }
}

struct SynthesisRouter {
    queue: QueueSender,
    events: Arc<EmitGate>,
}

impl SynthesisRouter {
    fn enqueue(&self, task: &Task, item: QueueItem) {
        if self.queue.send(item).is_err() {
            warn!(task_id = %task.id(), "Delivery queue closed");
        }
    }
}

impl InboundRouter for SynthesisRouter {
    fn on_started(&self, task: &Task) {
        self.events.emit(RealtimeEvent::Started {
            task_id: task.id().clone(),
        });
    }

    fn on_audio(&self, task: &Task, audio: Bytes) {
        self.enqueue(task, QueueItem::Audio(audio));
    }

    fn on_finished(&self, task: &Task) {
        self.enqueue(task, QueueItem::EndOfStream);
    }

    /// The receive loop has already moved the task to `Failed`.
    fn on_failed(&self, task: &Task, message: &str) {
        self.events.emit(RealtimeEvent::Failed {
            task_id: task.id().clone(),
            message: message.to_string(),
        });
        self.enqueue(task, QueueItem::Closed);
    }
}
