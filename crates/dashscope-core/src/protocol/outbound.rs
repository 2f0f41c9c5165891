//! Client → service control messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::task::{Task, TaskDirection, TaskId};

/// Value of `header.streaming` for every message on a duplex channel.
pub const STREAMING_DUPLEX: &str = "duplex";

/// Value of `payload.task_group` for speech tasks.
pub const TASK_GROUP_AUDIO: &str = "audio";

/// Control action requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Start a task (`Created → Running`).
    RunTask,
    /// Submit a text increment to a synthesis task.
    ContinueTask,
    /// Ask the service to finish the task (`Running → Finishing`).
    FinishTask,
}

/// `header` of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundHeader {
    pub action: Action,
    pub task_id: String,
    pub streaming: String,
}

/// `payload.input` of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// `payload` of an outbound message.
///
/// Only `run-task` carries the task description; continuation and finish
/// messages carry just `input`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub input: Input,
}

/// A complete outbound control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub header: OutboundHeader,
    pub payload: OutboundPayload,
}

impl OutboundMessage {
    fn with_action(action: Action, task_id: &TaskId, payload: OutboundPayload) -> Self {
        Self {
            header: OutboundHeader {
                action,
                task_id: task_id.to_string(),
                streaming: STREAMING_DUPLEX.to_string(),
            },
            payload,
        }
    }

    /// `run-task` for the given task, carrying its parameter snapshot.
    pub fn run_task(task: &Task) -> Self {
        Self::run(task.id(), task.direction(), task.model(), task.parameters().clone())
    }

    /// `run-task` built from its parts.
    pub fn run(
        task_id: &TaskId,
        direction: TaskDirection,
        model: &str,
        parameters: Value,
    ) -> Self {
        Self::with_action(
            Action::RunTask,
            task_id,
            OutboundPayload {
                task_group: Some(TASK_GROUP_AUDIO.to_string()),
                task: Some(direction.task_name().to_string()),
                function: Some(direction.function_name().to_string()),
                model: Some(model.to_string()),
                parameters: Some(parameters),
                input: Input::default(),
            },
        )
    }

    /// `continue-task` carrying one text increment.
    pub fn continue_text(task_id: &TaskId, text: impl Into<String>) -> Self {
        Self::with_action(
            Action::ContinueTask,
            task_id,
            OutboundPayload {
                input: Input {
                    text: Some(text.into()),
                },
                ..OutboundPayload::default()
            },
        )
    }

    /// `finish-task`.
    pub fn finish_task(task_id: &TaskId) -> Self {
        Self::with_action(Action::FinishTask, task_id, OutboundPayload::default())
    }

    pub const fn action(&self) -> Action {
        self.header.action
    }

    /// Serialize to the JSON text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame (used by test peers and diagnostics).
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
