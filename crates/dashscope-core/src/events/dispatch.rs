//! Typed handler table keyed by event kind.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::oneshot;

use super::RealtimeEvent;
use crate::error::{RealtimeError, Result};
use crate::ports::EventSink;

/// An event type that can be routed through a [`HandlerTable`].
pub trait Dispatch: Clone + Send + Sync + 'static {
    /// Routing key (usually a fieldless mirror of the event enum).
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of callbacks per event kind.
///
/// Handlers for a kind run in registration order, on the task that calls
/// [`dispatch`](Self::dispatch). The table lock is not held while handlers
/// run, so a handler may register further handlers.
pub struct HandlerTable<E: Dispatch> {
    handlers: RwLock<HashMap<E::Kind, Vec<Handler<E>>>>,
    waiters: Mutex<HashMap<E::Kind, Vec<oneshot::Sender<E>>>>,
}

impl<E: Dispatch> HandlerTable<E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for `kind`.
    pub fn on<F>(&self, kind: E::Kind, handler: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Resolve with the next event of `kind`.
    ///
    /// The waiter is registered when this is called, not when the returned
    /// future is first polled, so an event dispatched in between is not
    /// missed.
    pub fn wait_for(&self, kind: E::Kind) -> impl Future<Output = Result<E>> + Send + use<E> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(tx);
        async move { rx.await.map_err(|_| RealtimeError::ChannelClosed) }
    }

    /// Run every handler registered for the event's kind, then wake waiters.
    pub fn dispatch(&self, event: &E) {
        let kind = event.kind();
        let handlers: Vec<Handler<E>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(event);
        }

        let waiters = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .unwrap_or_default();
        for waiter in waiters {
            // The waiting future may have been dropped.
            let _ = waiter.send(event.clone());
        }
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl<E: Dispatch> Default for HandlerTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Dispatch> fmt::Debug for HandlerTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<E::Kind> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        f.debug_struct("HandlerTable")
            .field("kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl EventSink for HandlerTable<RealtimeEvent> {
    fn emit(&self, event: RealtimeEvent) {
        self.dispatch(&event);
    }
}
