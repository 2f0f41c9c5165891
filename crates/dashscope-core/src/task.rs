//! Task lifecycle state machine.
//!
//! ```text
//!   Created → Running → Finishing → Finished
//!      │         │          │
//!      └─────────┴──────────┴──────→ Failed(detail)
//! ```
//!
//! A [`Task`] is shared between the pipeline that issues operations and the
//! receive loop that applies peer-driven transitions, so its state lives in
//! a `tokio::sync::watch` channel: every transition is a compare-and-modify
//! under the channel's lock, and waiters (`request_finish`, session start)
//! observe transitions without polling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RealtimeError, Result};

/// Failure detail recorded when a task is abandoned by an interrupt.
pub const INTERRUPTED_DETAIL: &str = "task interrupted";

// ── Identity ───────────────────────────────────────────────────────

/// Opaque task identifier: 16 random bytes rendered as 32 hex characters.
///
/// A fresh id is generated for every task, including the replacement task
/// created by an interrupt, so late messages for an old task never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Which way audio flows for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDirection {
    /// Audio in, text out (ASR).
    Recognition,
    /// Text in, audio out (TTS).
    Synthesis,
}

impl TaskDirection {
    /// Wire value of `payload.task`.
    pub const fn task_name(self) -> &'static str {
        match self {
            Self::Recognition => "asr",
            Self::Synthesis => "tts",
        }
    }

    /// Wire value of `payload.function`.
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Recognition => "recognition",
            Self::Synthesis => "SpeechSynthesizer",
        }
    }
}

impl fmt::Display for TaskDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recognition => f.write_str("recognition"),
            Self::Synthesis => f.write_str("synthesis"),
        }
    }
}

// ── State ──────────────────────────────────────────────────────────

/// Lifecycle state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed, `run-task` not yet sent.
    Created,

    /// `run-task` sent; input is accepted.
    Running,

    /// `finish-task` sent; waiting for the peer's `task-finished`.
    Finishing,

    /// The peer acknowledged the finish.
    Finished,

    /// The peer reported a failure, the channel dropped, or the task was
    /// abandoned. Carries the error detail.
    Failed(String),
}

impl TaskState {
    /// Short lowercase label used in logs and errors.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Finishing => "finishing",
            Self::Finished => "finished",
            Self::Failed(_) => "failed",
        }
    }

    /// `Running` or `Finishing`.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Finishing)
    }

    /// `Finished` or `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(detail) => write!(f, "failed ({detail})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Value held in the watch channel.
#[derive(Debug, Clone)]
struct Snapshot {
    state: TaskState,
    /// Whether `task-started` has been received.
    acknowledged: bool,
}

// ── Task ───────────────────────────────────────────────────────────

/// One recognition or synthesis task.
pub struct Task {
    id: TaskId,
    direction: TaskDirection,
    model: String,
    parameters: Value,
    snapshot: watch::Sender<Snapshot>,
    abandoned: AtomicBool,
}

impl Task {
    /// Create a task in `Created` with a fresh id.
    pub fn new(direction: TaskDirection, model: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: TaskId::generate(),
            direction,
            model: model.into(),
            parameters,
            snapshot: watch::Sender::new(Snapshot {
                state: TaskState::Created,
                acknowledged: false,
            }),
            abandoned: AtomicBool::new(false),
        }
    }

    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    pub const fn direction(&self) -> TaskDirection {
        self.direction
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The configuration snapshot sent with `run-task`.
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Current state (cloned).
    pub fn state(&self) -> TaskState {
        self.snapshot.borrow().state.clone()
    }

    /// Whether the task is `Running` or `Finishing`.
    pub fn is_active(&self) -> bool {
        self.snapshot.borrow().state.is_active()
    }

    /// Whether the task is `Finished` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.snapshot.borrow().state.is_terminal()
    }

    /// Whether the peer has sent `task-started`.
    pub fn is_acknowledged(&self) -> bool {
        self.snapshot.borrow().acknowledged
    }

    /// Whether the task was abandoned by an interrupt.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    // ── Transitions ────────────────────────────────────────────────

    /// `Created → Running`, applied when `run-task` is submitted.
    pub fn mark_running(&self) -> Result<()> {
        self.transition("start", |state| match state {
            TaskState::Created => Ok(Some(TaskState::Running)),
            other => Err(other.label()),
        })
        .map(|_| ())
    }

    /// Record the peer's `task-started`.
    pub fn acknowledge(&self) {
        self.snapshot.send_if_modified(|snapshot| {
            let changed = !snapshot.acknowledged;
            snapshot.acknowledged = true;
            changed
        });
    }

    /// Check that input may be submitted (only legal in `Running`).
    pub fn ensure_accepts_input(&self, operation: &'static str) -> Result<()> {
        let snapshot = self.snapshot.borrow();
        if snapshot.state == TaskState::Running {
            Ok(())
        } else {
            Err(RealtimeError::invalid_state(operation, snapshot.state.label()))
        }
    }

    /// `Running → Finishing`.
    ///
    /// Returns `Ok(true)` when the caller must send `finish-task`, and
    /// `Ok(false)` when the task is already finishing or terminal, so a
    /// repeated finish never produces a duplicate control message.
    pub fn begin_finish(&self) -> Result<bool> {
        self.transition("request_finish", |state| match state {
            TaskState::Running => Ok(Some(TaskState::Finishing)),
            TaskState::Finishing | TaskState::Finished | TaskState::Failed(_) => Ok(None),
            TaskState::Created => Err("created"),
        })
    }

    /// Any non-terminal state `→ Finished`, on the peer's `task-finished`.
    ///
    /// Returns whether the transition happened.
    pub fn complete(&self) -> bool {
        self.transition("complete", |state| {
            Ok(if state.is_terminal() {
                None
            } else {
                Some(TaskState::Finished)
            })
        })
        .unwrap_or(false)
    }

    /// Any non-terminal state `→ Failed(detail)`.
    ///
    /// Returns whether the transition happened; a terminal task stays as is.
    pub fn fail(&self, detail: impl Into<String>) -> bool {
        let detail = detail.into();
        self.transition("fail", move |state| {
            Ok(if state.is_terminal() {
                None
            } else {
                Some(TaskState::Failed(detail))
            })
        })
        .unwrap_or(false)
    }

    /// Mark the task as abandoned by an interrupt and move it to `Failed`.
    ///
    /// Frames still in flight for this task are discarded from here on.
    pub fn abandon(&self) -> bool {
        self.abandoned.store(true, Ordering::SeqCst);
        self.fail(INTERRUPTED_DETAIL)
    }

    fn transition(
        &self,
        operation: &'static str,
        step: impl FnOnce(&TaskState) -> std::result::Result<Option<TaskState>, &'static str>,
    ) -> Result<bool> {
        let mut outcome = Ok(false);
        self.snapshot.send_if_modified(|snapshot| {
            match step(&snapshot.state) {
                Ok(Some(next)) => {
                    debug!(
                        task_id = %self.id,
                        direction = %self.direction,
                        from = snapshot.state.label(),
                        to = next.label(),
                        "Task state transition"
                    );
                    snapshot.state = next;
                    outcome = Ok(true);
                    true
                }
                Ok(None) => false,
                Err(label) => {
                    outcome = Err(RealtimeError::invalid_state(operation, label));
                    false
                }
            }
        });
        outcome
    }

    // ── Waiting ────────────────────────────────────────────────────

    /// Suspend until the task is terminal, or the deadline elapses.
    ///
    /// Resolves to `Ok(())` for `Finished`, and to the matching error for
    /// `Failed` (`Interrupted` when the task was abandoned).
    pub async fn wait_terminal(&self, deadline: Option<Duration>) -> Result<()> {
        let mut rx = self.snapshot.subscribe();
        let wait = async move {
            rx.wait_for(|snapshot| snapshot.state.is_terminal())
                .await
                .map(|snapshot| snapshot.state.clone())
                .map_err(|_| RealtimeError::ChannelClosed)
        };
        let state = with_deadline(deadline, wait).await??;
        self.outcome_of(&state)
    }

    /// Suspend until `task-started` arrives, the task fails, or the deadline
    /// elapses.
    pub async fn wait_started(&self, deadline: Option<Duration>) -> Result<()> {
        let mut rx = self.snapshot.subscribe();
        let wait = async move {
            rx.wait_for(|snapshot| snapshot.acknowledged || snapshot.state.is_terminal())
                .await
                .map(|snapshot| snapshot.state.clone())
                .map_err(|_| RealtimeError::ChannelClosed)
        };
        let state = with_deadline(deadline, wait).await??;
        if state.is_terminal() {
            // A task that failed before (or instead of) acknowledging.
            return self.outcome_of(&state);
        }
        Ok(())
    }

    fn outcome_of(&self, state: &TaskState) -> Result<()> {
        match state {
            TaskState::Failed(_) if self.is_abandoned() => Err(RealtimeError::Interrupted {
                task_id: self.id.to_string(),
            }),
            TaskState::Failed(message) => Err(RealtimeError::ProtocolFailure {
                task_id: self.id.to_string(),
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    future: impl Future<Output = T>,
) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| RealtimeError::Timeout(limit)),
        None => Ok(future.await),
    }
}
