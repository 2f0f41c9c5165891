//! Delivery task: hands queued synthesis audio to the consumer at its pace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use dashscope_core::{AudioSink, EventSink, RealtimeEvent, Task, TaskState};

/// Item on the receive-loop → delivery queue.
#[derive(Debug)]
pub(crate) enum QueueItem {
    Audio(Bytes),
    /// `task-finished` arrived: finish the consumer and emit `Finished`.
    EndOfStream,
    /// `task-failed` arrived: stop without a terminal event.
    Closed,
}

pub(crate) type QueueSender = mpsc::UnboundedSender<QueueItem>;
pub(crate) type QueueReceiver = mpsc::UnboundedReceiver<QueueItem>;

/// Serialises event emission for one task between the receive loop and the
/// delivery task.
///
/// The task is moved to `Failed` before [`emit_failed`](Self::emit_failed)
/// takes the lock, so an `AudioChunk` checked under the lock either lands
/// before `Failed` or is not emitted at all.
pub(crate) struct EmitGate {
    events: Arc<dyn EventSink>,
    lock: Mutex<()>,
}

impl EmitGate {
    pub(crate) fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn emit(&self, event: RealtimeEvent) {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.events.emit(event);
    }

    /// Emit `event` unless the task has failed. Returns whether it was emitted.
    pub(crate) fn emit_unless_failed(&self, task: &Task, event: RealtimeEvent) -> bool {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if is_failed(task) {
            return false;
        }
        self.events.emit(event);
        true
    }

    /// Fail the task and emit `Failed`, unless it is already terminal.
    pub(crate) fn fail(&self, task: &Task, message: String) {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if task.fail(message.clone()) {
            self.events.emit(RealtimeEvent::Failed {
                task_id: task.id().clone(),
                message,
            });
        }
    }
}

/// Handle to a running delivery task.
pub(crate) struct Delivery {
    cancel: CancellationToken,
    stopped: CancellationToken,
    handle: JoinHandle<()>,
}

impl Delivery {
    pub(crate) fn spawn(
        task: Arc<Task>,
        queue: QueueReceiver,
        consumer: Arc<dyn AudioSink>,
        events: Arc<EmitGate>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let live = LiveGuard::new(live);
        let handle = tokio::spawn(deliver(
            task,
            queue,
            consumer,
            events,
            cancel.clone(),
            stopped.clone(),
            live,
        ));
        Self {
            cancel,
            stopped,
            handle,
        }
    }

    /// Cancelled when the delivery task has exited.
    pub(crate) fn stopped(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// Cancel and wait for the acknowledged stop.
    ///
    /// A consumer callback in progress is allowed to return first.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        self.stopped.cancelled().await;
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Delivery task panicked");
        }
    }
}

/// Counts live delivery tasks; decremented when the task (or its unpolled
/// future) is dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn is_failed(task: &Task) -> bool {
    matches!(task.state(), TaskState::Failed(_))
}

async fn deliver(
    task: Arc<Task>,
    mut queue: QueueReceiver,
    consumer: Arc<dyn AudioSink>,
    events: Arc<EmitGate>,
    cancel: CancellationToken,
    stopped: CancellationToken,
    live: LiveGuard,
) {
    let _stopped = stopped.drop_guard();
    // Dropped before `_stopped`, so the count is current once stop is seen.
    let _live = live;
    let task_id = task.id().clone();
    let mut delivered = 0_usize;

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(%task_id, delivered, "Delivery cancelled");
                break;
            }
            item = queue.recv() => item,
        };

        match item {
            Some(QueueItem::Audio(audio)) => {
                if is_failed(&task) {
                    trace!(%task_id, "Dropping audio for failed task");
                    continue;
                }
                if let Err(err) = consumer.push(audio.clone()).await {
                    warn!(%task_id, error = %err, "Audio consumer failed");
                    events.fail(&task, err.to_string());
                    break;
                }
                delivered += 1;
                let chunk = RealtimeEvent::AudioChunk {
                    task_id: task_id.clone(),
                    audio,
                };
                if !events.emit_unless_failed(&task, chunk) {
                    trace!(%task_id, "Task failed during push");
                }
            }
            Some(QueueItem::EndOfStream) => {
                if let Err(err) = consumer.finish().await {
                    warn!(%task_id, error = %err, "Audio consumer failed to finish");
                }
                debug!(%task_id, delivered, "Delivery complete");
                events.emit(RealtimeEvent::Finished {
                    task_id: task_id.clone(),
                });
                break;
            }
            Some(QueueItem::Closed) | None => {
                debug!(%task_id, delivered, "Delivery closed");
                break;
            }
        }
    }
}
