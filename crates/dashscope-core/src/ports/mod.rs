//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define what the pipelines expect from infrastructure. They use only
//! domain types: no websocket, file or runtime types in any signature.
//!
//! - [`transport`] - a bidirectional message channel and how to open one
//! - [`audio`] - where recognition audio comes from and synthesis audio goes
//! - [`event_sink`] - where pipeline events are delivered

pub mod audio;
pub mod event_sink;
pub mod transport;

pub use audio::{AudioSink, AudioSource};
pub use event_sink::{ChannelSink, EventSink, NoopSink};
pub use transport::{Channel, Connector, Frame, FrameReceiver, FrameSender};
