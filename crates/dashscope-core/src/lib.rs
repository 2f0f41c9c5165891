//! Core types for the DashScope realtime speech client.
//!
//! This crate holds everything that does not depend on a concrete transport:
//!
//! - [`protocol`] - the JSON control envelope codec
//! - [`task`] - the per-task lifecycle state machine
//! - [`config`] - connection, recognition and synthesis configuration
//! - [`events`] - decoded protocol events and the typed handler table
//! - [`ports`] - trait seams for transports, audio I/O and event sinks
//!
//! Pipelines that drive these types over a real websocket live in
//! `dashscope-voice`.

#![deny(unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod protocol;
pub mod task;

pub use config::{
    API_KEY_ENV, AsrConfig, ConnectionConfig, DEFAULT_START_TIMEOUT, DEFAULT_WS_URL, ReconnectPolicy,
    TtsConfig, URL_ENV,
};
pub use error::{RealtimeError, Result};
pub use events::{Dispatch, EventKind, HandlerTable, RealtimeEvent};
pub use ports::{
    AudioSink, AudioSource, Channel, ChannelSink, Connector, EventSink, Frame, FrameReceiver,
    FrameSender, NoopSink,
};
pub use protocol::{Inbound, InboundEventKind, InboundMessage, OutboundMessage, Sentence};
pub use task::{Task, TaskDirection, TaskId, TaskState};
