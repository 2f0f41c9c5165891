//! Service → client control messages.

use serde::{Deserialize, Serialize};

/// Fallback failure detail when the peer supplies none.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// `header.event` of an inbound control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InboundEventKind {
    TaskStarted,
    ResultGenerated,
    TaskFinished,
    TaskFailed,
    /// Any event this client does not understand; ignored by the receive loop.
    #[serde(other)]
    Unknown,
}

impl InboundEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskStarted => "task-started",
            Self::ResultGenerated => "result-generated",
            Self::TaskFinished => "task-finished",
            Self::TaskFailed => "task-failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundHeader {
    pub event: InboundEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A recognised sentence, possibly still in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_end: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<bool>,
}

impl Sentence {
    /// Whether this result closes the sentence.
    ///
    /// An explicit `sentence_end` wins; older models omit it and only set
    /// `end_time` once the sentence is final.
    pub const fn is_end(&self) -> bool {
        match self.sentence_end {
            Some(end) => end,
            None => self.end_time.is_some(),
        }
    }

    pub const fn is_heartbeat(&self) -> bool {
        matches!(self.heartbeat, Some(true))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<Sentence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A decoded inbound control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub header: InboundHeader,
    #[serde(default)]
    pub payload: InboundPayload,
}

impl InboundMessage {
    pub const fn event(&self) -> InboundEventKind {
        self.header.event
    }

    pub fn task_id(&self) -> Option<&str> {
        self.header.task_id.as_deref()
    }

    /// The sentence carried by a `result-generated` message, if any.
    pub fn sentence(&self) -> Option<&Sentence> {
        self.payload.output.as_ref()?.sentence.as_ref()
    }

    /// Failure detail: `header.error_message`, then `payload.message`, then
    /// [`UNKNOWN_ERROR`].
    pub fn failure_message(&self) -> String {
        self.header
            .error_message
            .as_deref()
            .or(self.payload.message.as_deref())
            .filter(|message| !message.is_empty())
            .unwrap_or(UNKNOWN_ERROR)
            .to_string()
    }

    // Constructors used by in-memory peers.

    pub fn new(event: InboundEventKind, task_id: &str) -> Self {
        Self {
            header: InboundHeader {
                event,
                task_id: Some(task_id.to_string()),
                error_code: None,
                error_message: None,
            },
            payload: InboundPayload::default(),
        }
    }

    pub fn started(task_id: &str) -> Self {
        Self::new(InboundEventKind::TaskStarted, task_id)
    }

    pub fn finished(task_id: &str) -> Self {
        Self::new(InboundEventKind::TaskFinished, task_id)
    }

    pub fn failed(task_id: &str, code: &str, message: &str) -> Self {
        let mut msg = Self::new(InboundEventKind::TaskFailed, task_id);
        msg.header.error_code = Some(code.to_string());
        msg.header.error_message = Some(message.to_string());
        msg
    }

    pub fn result(task_id: &str, text: &str, sentence_end: bool) -> Self {
        let mut msg = Self::new(InboundEventKind::ResultGenerated, task_id);
        msg.payload.output = Some(Output {
            sentence: Some(Sentence {
                text: text.to_string(),
                sentence_end: Some(sentence_end),
                ..Sentence::default()
            }),
        });
        msg
    }

    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
