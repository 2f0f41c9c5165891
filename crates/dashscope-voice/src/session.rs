//! One open channel carrying exactly one task, plus its receive loop.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use dashscope_core::protocol::{self, Inbound, InboundEventKind, InboundMessage, Sentence};
use dashscope_core::{
    Channel, Connector, FrameReceiver, FrameSender, OutboundMessage, RealtimeError, Result, Task,
};

/// Failure detail when the channel drops while the task is active.
const CONNECTION_LOST: &str = "connection closed unexpectedly";

/// Failure detail for a task still active when its session is closed.
const SESSION_CLOSED: &str = "session closed";

/// Direction-specific handling of inbound traffic.
///
/// The receive loop applies the task transition first and only calls the
/// router when the transition actually happened, so each terminal callback
/// fires at most once per task.
pub(crate) trait InboundRouter: Send + Sync + 'static {
    fn on_started(&self, task: &Task);

    fn on_result(&self, _task: &Task, _sentence: &Sentence) {}

    fn on_audio(&self, task: &Task, _audio: Bytes) {
        debug!(task_id = %task.id(), "Ignoring unexpected binary frame");
    }

    fn on_finished(&self, task: &Task);

    fn on_failed(&self, task: &Task, message: &str);
}

pub(crate) struct Session {
    task: Arc<Task>,
    sender: Arc<dyn FrameSender>,
    cancel: CancellationToken,
    settled: CancellationToken,
    receive_loop: Option<JoinHandle<()>>,
}

impl Session {
    /// Open a channel, start the receive loop and submit `run-task`.
    ///
    /// With a `start_timeout`, also waits for the peer's `task-started`.
    pub(crate) async fn open(
        connector: &dyn Connector,
        task: Arc<Task>,
        router: Arc<dyn InboundRouter>,
        start_timeout: Option<Duration>,
    ) -> Result<Self> {
        let Channel { sender, receiver } = connector.open().await?;
        let cancel = CancellationToken::new();
        let settled = CancellationToken::new();
        let receive_loop = tokio::spawn(receive_loop(
            Arc::clone(&task),
            receiver,
            router,
            cancel.clone(),
            settled.clone(),
        ));

        let mut session = Self {
            task,
            sender,
            cancel,
            settled,
            receive_loop: Some(receive_loop),
        };
        if let Err(err) = session.start(start_timeout).await {
            session.close().await;
            return Err(err);
        }
        Ok(session)
    }

    async fn start(&self, start_timeout: Option<Duration>) -> Result<()> {
        self.task.mark_running()?;
        let run_task = OutboundMessage::run_task(&self.task).encode()?;
        if let Err(err) = self.sender.send_text(run_task).await {
            self.task.fail(err.to_string());
            return Err(err);
        }
        info!(
            task_id = %self.task.id(),
            direction = %self.task.direction(),
            model = self.task.model(),
            "Task submitted"
        );

        if let Some(limit) = start_timeout {
            self.task.wait_started(Some(limit)).await?;
            debug!(task_id = %self.task.id(), "Task acknowledged");
        }
        Ok(())
    }

    pub(crate) const fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Cancelled once the receive loop has exited, i.e. after the terminal
    /// event for the task (if any) has been routed.
    pub(crate) fn settled(&self) -> CancellationToken {
        self.settled.clone()
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<()> {
        self.sender.send_text(text).await
    }

    pub(crate) async fn send_audio(&self, audio: Bytes) -> Result<()> {
        self.sender.send_binary(audio).await
    }

    /// Move the task to `Finishing` and send `finish-task` exactly once.
    ///
    /// Returns whether a message was sent.
    pub(crate) async fn finish(&self) -> Result<bool> {
        if !self.task.begin_finish()? {
            trace!(task_id = %self.task.id(), "Finish already requested");
            return Ok(false);
        }
        let finish = OutboundMessage::finish_task(self.task.id()).encode()?;
        if let Err(err) = self.sender.send_text(finish).await {
            self.task.fail(err.to_string());
            return Err(err);
        }
        debug!(task_id = %self.task.id(), "Finish requested");
        Ok(true)
    }

    /// Stop the receive loop and close the channel.
    ///
    /// A task that is still active is moved to `Failed` without routing any
    /// event. Idempotent.
    pub(crate) async fn close(&mut self) {
        self.cancel.cancel();
        if let Err(err) = self.sender.close().await {
            debug!(error = %err, "Channel close failed");
        }
        if let Some(handle) = self.receive_loop.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Receive loop panicked");
            }
        }
        if self.task.fail(SESSION_CLOSED) {
            debug!(task_id = %self.task.id(), "Closed session with active task");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    task: Arc<Task>,
    mut receiver: Box<dyn FrameReceiver>,
    router: Arc<dyn InboundRouter>,
    cancel: CancellationToken,
    settled: CancellationToken,
) {
    let _settled = settled.drop_guard();

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace!(task_id = %task.id(), "Receive loop cancelled");
                break;
            }
            frame = receiver.receive() => frame,
            // Failed from outside the loop (consumer error, interrupt).
            _ = task.wait_terminal(None) => {
                trace!(task_id = %task.id(), "Task ended outside the receive loop");
                break;
            }
        };

        if task.is_terminal() {
            trace!(task_id = %task.id(), "Discarding frame for terminal task");
            break;
        }

        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                if task.fail(CONNECTION_LOST) {
                    warn!(task_id = %task.id(), error = %err, "Channel dropped mid-task");
                    router.on_failed(&task, CONNECTION_LOST);
                }
                break;
            }
        };

        match protocol::decode(frame) {
            Ok(Inbound::Audio(audio)) => router.on_audio(&task, audio),
            Ok(Inbound::Control(message)) => {
                if handle_control(&task, router.as_ref(), &message) {
                    break;
                }
            }
            Err(err) => warn!(task_id = %task.id(), error = %err, "Dropping malformed frame"),
        }
    }
}

/// Apply one control message. Returns `true` once the task is terminal.
fn handle_control(task: &Task, router: &dyn InboundRouter, message: &InboundMessage) -> bool {
    if let Some(id) = message.task_id() {
        if task.id() != id {
            debug!(
                task_id = %task.id(),
                received = id,
                event = message.event().as_str(),
                "Discarding message for another task"
            );
            return false;
        }
    }

    match message.event() {
        InboundEventKind::TaskStarted => {
            router.on_started(task);
            task.acknowledge();
            false
        }
        InboundEventKind::ResultGenerated => {
            match message.sentence() {
                Some(sentence) if !sentence.is_heartbeat() => router.on_result(task, sentence),
                _ => trace!(task_id = %task.id(), "Result without sentence"),
            }
            false
        }
        InboundEventKind::TaskFinished => {
            if task.complete() {
                info!(task_id = %task.id(), "Task finished");
                router.on_finished(task);
            }
            true
        }
        InboundEventKind::TaskFailed => {
            let detail = message.failure_message();
            if task.fail(detail.clone()) {
                warn!(
                    task_id = %task.id(),
                    error_code = message.header.error_code.as_deref().unwrap_or("-"),
                    error = %detail,
                    "Task failed"
                );
                router.on_failed(task, &detail);
            }
            true
        }
        InboundEventKind::Unknown => {
            debug!(task_id = %task.id(), "Ignoring unknown event");
            false
        }
    }
}

/// Bound `future` by an optional deadline.
pub(crate) async fn with_deadline<T>(
    deadline: Option<Duration>,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| RealtimeError::Timeout(limit))?,
        None => future.await,
    }
}
