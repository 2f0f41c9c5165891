//! Event sink port and the in-process adapters.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::RealtimeEvent;

/// Receives pipeline events.
///
/// Called from the receive loop and the delivery task, so implementations
/// must not block.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RealtimeEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: RealtimeEvent) {
        (**self).emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: RealtimeEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<RealtimeEvent>);

impl ChannelSink {
    /// Create a sink and the receiver that yields its events in order.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RealtimeEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.0.send(event);
    }
}
