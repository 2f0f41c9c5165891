//! Transport port: an ordered, bidirectional channel of text and binary
//! frames.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One message on the channel.
#[derive(Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON control envelope.
    Text(String),
    /// Raw audio.
    Binary(Bytes),
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

/// Sending half of a channel.
///
/// Shared between the pipeline (control messages, recognition audio) and
/// shutdown paths, so it takes `&self`; implementations serialise writes
/// internally.
#[async_trait]
pub trait FrameSender: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;

    async fn send_binary(&self, audio: Bytes) -> Result<()>;

    /// Close the channel. Idempotent.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Receiving half of a channel.
///
/// Owned by exactly one receive loop; `&mut self` makes that structural.
#[async_trait]
pub trait FrameReceiver: Send {
    /// Next frame in arrival order.
    ///
    /// Returns [`ChannelClosed`](crate::RealtimeError::ChannelClosed) once
    /// the peer closes or the network drops.
    async fn receive(&mut self) -> Result<Frame>;
}

/// An open channel, split into its two halves.
pub struct Channel {
    pub sender: Arc<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
}

impl Channel {
    pub fn new(sender: Arc<dyn FrameSender>, receiver: Box<dyn FrameReceiver>) -> Self {
        Self { sender, receiver }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.sender.is_closed())
            .finish_non_exhaustive()
    }
}

/// Opens channels to the speech service.
///
/// Every task gets its own channel; a pipeline calls `open` again after an
/// interrupt or an on-demand reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Channel>;
}
