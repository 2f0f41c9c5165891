//! Websocket transport adapter over `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use dashscope_core::{
    Channel, ConnectionConfig, Connector, Frame, FrameReceiver, FrameSender, RealtimeError, Result,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Detail of the `Send` error for a write after close.
const WRITE_AFTER_CLOSE: &str = "channel closed";

/// Opens one authenticated websocket per task.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ConnectionConfig,
}

impl WsConnector {
    /// Validate the configuration and install the TLS crypto provider.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        // Fails only when a provider is already installed for the process.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Ok(Self { config })
    }

    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Channel> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let authorization = HeaderValue::from_str(&self.config.authorization())
            .map_err(|e| RealtimeError::Config(format!("invalid API key: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, authorization);

        debug!(url = %self.config.url, key = %self.config.redacted_key(), "Opening websocket");
        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "Websocket connected");

        let (sink, stream) = stream.split();
        Ok(Channel::new(
            Arc::new(WsSender {
                sink: Mutex::new(sink),
                closed: AtomicBool::new(false),
            }),
            Box::new(WsReceiver { stream }),
        ))
    }
}

struct WsSender {
    sink: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
}

impl WsSender {
    async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(RealtimeError::Send(WRITE_AFTER_CLOSE.into()));
        }
        self.sink.lock().await.send(message).await.map_err(|err| {
            if matches!(
                err,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ) {
                self.closed.store(true, Ordering::SeqCst);
                RealtimeError::Send(WRITE_AFTER_CLOSE.into())
            } else {
                RealtimeError::Send(err.to_string())
            }
        })
    }
}

#[async_trait]
impl FrameSender for WsSender {
    async fn send_text(&self, text: String) -> Result<()> {
        trace!(len = text.len(), "Sending text frame");
        self.send(Message::Text(text.into())).await
    }

    async fn send_binary(&self, audio: Bytes) -> Result<()> {
        self.send(Message::Binary(audio)).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.sink.lock().await.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(err) => Err(RealtimeError::Send(err.to_string())),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct WsReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReceiver for WsReceiver {
    async fn receive(&mut self) -> Result<Frame> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Frame::Text(text.as_str().to_owned())),
                Ok(Message::Binary(audio)) => return Ok(Frame::Binary(audio)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer closed websocket");
                    return Err(RealtimeError::ChannelClosed);
                }
                // Pongs are queued by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(err) => {
                    warn!(error = %err, "Websocket receive failed");
                    return Err(RealtimeError::ChannelClosed);
                }
            }
        }
        Err(RealtimeError::ChannelClosed)
    }
}
