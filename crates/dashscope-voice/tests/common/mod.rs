//! In-memory peer for pipeline tests: a `Connector` whose channels are
//! driven by the test instead of the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Semaphore, mpsc};

use dashscope_core::protocol::{Action, InboundMessage, OutboundMessage};
use dashscope_core::{
    AudioSink, Channel, Connector, EventKind, Frame, FrameReceiver, FrameSender, RealtimeError,
    RealtimeEvent, Result,
};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector that hands each opened channel's far end to the test.
pub struct ScriptedConnector {
    peers: mpsc::UnboundedSender<Peer>,
    auto_start: bool,
    opened: AtomicUsize,
    refuse: AtomicBool,
}

/// Receives the far end of every channel the pipeline opens.
pub struct Peers(mpsc::UnboundedReceiver<Peer>);

impl Peers {
    /// The next opened channel.
    pub async fn next(&mut self) -> Peer {
        tokio::time::timeout(STEP_TIMEOUT, self.0.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Whether another channel has been opened.
    pub fn try_next(&mut self) -> Option<Peer> {
        self.0.try_recv().ok()
    }
}

impl ScriptedConnector {
    /// Peers reply `task-started` to every `run-task` automatically.
    pub fn new() -> (Arc<Self>, Peers) {
        Self::build(true)
    }

    /// Peers never acknowledge on their own.
    pub fn silent() -> (Arc<Self>, Peers) {
        Self::build(false)
    }

    fn build(auto_start: bool) -> (Arc<Self>, Peers) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                peers: tx,
                auto_start,
                opened: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
            }),
            Peers(rx),
        )
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make every further `open` fail with `Connect`.
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self) -> Result<Channel> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Connect("connection refused".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let sender = MemorySender {
            to_peer: to_peer_tx,
            to_client: to_client_tx.downgrade(),
            auto_start: self.auto_start,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let closed = Arc::clone(&sender.closed);
        let peer = Peer {
            from_client: to_peer_rx,
            to_client: Some(to_client_tx),
            client_closed: closed,
            task_id: None,
        };
        self.peers
            .send(peer)
            .map_err(|_| RealtimeError::Connect("test dropped peers".into()))?;

        Ok(Channel::new(
            Arc::new(sender),
            Box::new(MemoryReceiver { rx: to_client_rx }),
        ))
    }
}

struct MemorySender {
    to_peer: mpsc::UnboundedSender<Frame>,
    /// Used for automatic `task-started` replies; weak so a peer hang-up
    /// still closes the client's receiving half.
    to_client: mpsc::WeakUnboundedSender<Frame>,
    auto_start: bool,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSender for MemorySender {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(RealtimeError::Send("channel closed".into()));
        }
        if self.auto_start {
            if let Ok(message) = OutboundMessage::decode(&text) {
                if message.action() == Action::RunTask {
                    let started = InboundMessage::started(&message.header.task_id)
                        .encode()
                        .unwrap();
                    if let Some(tx) = self.to_client.upgrade() {
                        let _ = tx.send(Frame::Text(started));
                    }
                }
            }
        }
        self.to_peer
            .send(Frame::Text(text))
            .map_err(|_| RealtimeError::Send("peer gone".into()))
    }

    async fn send_binary(&self, audio: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(RealtimeError::Send("channel closed".into()));
        }
        self.to_peer
            .send(Frame::Binary(audio))
            .map_err(|_| RealtimeError::Send("peer gone".into()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameReceiver for MemoryReceiver {
    async fn receive(&mut self) -> Result<Frame> {
        self.rx.recv().await.ok_or(RealtimeError::ChannelClosed)
    }
}

/// Far end of one channel.
pub struct Peer {
    from_client: mpsc::UnboundedReceiver<Frame>,
    to_client: Option<mpsc::UnboundedSender<Frame>>,
    client_closed: Arc<AtomicBool>,
    task_id: Option<String>,
}

impl Peer {
    /// Next frame sent by the client.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(STEP_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side dropped")
    }

    /// A client frame that has already arrived, if any.
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Next control message, skipping audio frames.
    pub async fn next_control(&mut self) -> OutboundMessage {
        loop {
            if let Frame::Text(text) = self.next_frame().await {
                return OutboundMessage::decode(&text).unwrap();
            }
        }
    }

    /// Expect `run-task` and remember its task id.
    pub async fn expect_run_task(&mut self) -> OutboundMessage {
        let message = self.next_control().await;
        assert_eq!(message.action(), Action::RunTask);
        self.task_id = Some(message.header.task_id.clone());
        message
    }

    /// Collect client frames until the next control message.
    pub async fn audio_until_control(&mut self) -> (Vec<Bytes>, OutboundMessage) {
        let mut audio = Vec::new();
        loop {
            match self.next_frame().await {
                Frame::Binary(chunk) => audio.push(chunk),
                Frame::Text(text) => return (audio, OutboundMessage::decode(&text).unwrap()),
            }
        }
    }

    pub fn task_id(&self) -> &str {
        self.task_id.as_deref().expect("run-task not seen yet")
    }

    pub fn send(&self, message: &InboundMessage) {
        self.send_frame(Frame::Text(message.encode().unwrap()));
    }

    pub fn send_frame(&self, frame: Frame) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame);
        }
    }

    pub fn send_audio(&self, audio: &'static [u8]) {
        self.send_frame(Frame::Binary(Bytes::from_static(audio)));
    }

    pub fn started(&self) {
        self.send(&InboundMessage::started(self.task_id()));
    }

    pub fn result(&self, text: &str, sentence_end: bool) {
        self.send(&InboundMessage::result(self.task_id(), text, sentence_end));
    }

    pub fn finished(&self) {
        self.send(&InboundMessage::finished(self.task_id()));
    }

    pub fn failed(&self, message: &str) {
        self.send(&InboundMessage::failed(self.task_id(), "InternalError", message));
    }

    /// Drop the peer's sending half, as if the network went away.
    pub fn hang_up(&mut self) {
        self.to_client.take();
    }

    pub fn client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

/// Audio consumer that records chunks and can be held closed.
pub struct RecordingSink {
    chunks: Mutex<Vec<Bytes>>,
    finished: AtomicUsize,
    permits: Option<Semaphore>,
    fail_on_push: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            permits: None,
            fail_on_push: AtomicBool::new(false),
        })
    }

    /// Every `push` waits for a permit from [`release`](Self::release).
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            permits: Some(Semaphore::new(0)),
            fail_on_push: AtomicBool::new(false),
        })
    }

    pub fn release(&self, count: usize) {
        if let Some(permits) = &self.permits {
            permits.add_permits(count);
        }
    }

    pub fn fail_pushes(&self) {
        self.fail_on_push.store(true, Ordering::SeqCst);
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn push(&self, audio: Bytes) -> Result<()> {
        if let Some(permits) = &self.permits {
            permits
                .acquire()
                .await
                .map_err(|e| RealtimeError::Audio(e.to_string()))?
                .forget();
        }
        if self.fail_on_push.load(Ordering::SeqCst) {
            return Err(RealtimeError::Audio("speaker unplugged".into()));
        }
        self.chunks.lock().unwrap().push(audio);
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Await the next event from a `ChannelSink` receiver.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> RealtimeEvent {
    tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event sink dropped")
}

/// Await events until one of `kind` arrives; returns everything seen.
pub async fn events_until(
    rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>,
    kind: EventKind,
) -> Vec<RealtimeEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event.kind() == kind;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Drain whatever events are already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> Vec<RealtimeEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}
