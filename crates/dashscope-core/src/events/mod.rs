//! Events surfaced by the recognition and synthesis pipelines.
//!
//! # Ordering
//!
//! For a single task, events are emitted in the order the corresponding
//! frames arrived, and [`RealtimeEvent::Finished`] / [`RealtimeEvent::Failed`]
//! is always the last event for that task. Audio chunks reach the consumer
//! in arrival order before `Finished`.

mod dispatch;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

pub use dispatch::{Dispatch, HandlerTable};

/// An event produced while driving a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// The peer acknowledged `run-task`.
    Started { task_id: TaskId },

    /// Current best transcript of the sentence in progress.
    Partial { task_id: TaskId, text: String },

    /// A finalized recognition sentence.
    SentenceEnd { task_id: TaskId, text: String },

    /// One synthesized audio frame, delivered in arrival order.
    AudioChunk { task_id: TaskId, audio: Bytes },

    /// The task finished cleanly. Terminal.
    Finished { task_id: TaskId },

    /// The task failed. Terminal.
    Failed { task_id: TaskId, message: String },
}

/// Discriminant of [`RealtimeEvent`], used as a handler-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Partial,
    SentenceEnd,
    AudioChunk,
    Finished,
    Failed,
}

impl RealtimeEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Started { .. } => EventKind::Started,
            Self::Partial { .. } => EventKind::Partial,
            Self::SentenceEnd { .. } => EventKind::SentenceEnd,
            Self::AudioChunk { .. } => EventKind::AudioChunk,
            Self::Finished { .. } => EventKind::Finished,
            Self::Failed { .. } => EventKind::Failed,
        }
    }

    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Started { task_id }
            | Self::Partial { task_id, .. }
            | Self::SentenceEnd { task_id, .. }
            | Self::AudioChunk { task_id, .. }
            | Self::Finished { task_id }
            | Self::Failed { task_id, .. } => task_id,
        }
    }

    /// `Finished` or `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}

impl Dispatch for RealtimeEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        Self::kind(self)
    }
}
