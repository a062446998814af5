//! Frame transports.
//!
//! # Responsibilities
//! - Reduce WebSocket messages to text/binary frames
//! - Dial downstream bot apps with the OneBot handshake headers
//! - Provide an in-memory transport pair for tests
//!
//! # Design Decisions
//! - Ping/pong are answered by the WebSocket layer and never surface as frames
//! - A close frame surfaces as `TransportError::Closed`, ending the reader

use async_trait::async_trait;
use futures_util::{future, sink, stream, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::config::schema::{BotAppConfig, ServerConfig};

/// Handshake timeout used when dialing bot apps.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Upper bound on flushing and closing a transport that is being torn down.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Client role announced to bot apps.
pub const CLIENT_ROLE: &str = "Universal";

/// A data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("upgraded socket error: {0}")]
    Upgraded(#[from] axum::Error),

    #[error("connection closed")]
    Closed,

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid handshake request: {0}")]
    InvalidRequest(String),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Both halves of an established connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Global atomic counter for link ids.
static LINK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one connection attempt, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub fn new() -> Self {
        Self(LINK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Where and how to dial one bot app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub name: String,
    pub uri: String,
    pub access_token: String,
    pub self_id: String,
    pub user_agent: String,
}

impl DialTarget {
    pub fn new(app: &BotAppConfig, server: &ServerConfig) -> Self {
        Self {
            name: app.name.clone(),
            uri: app.uri.clone(),
            access_token: app.access_token.clone(),
            self_id: server.bot_id.clone(),
            user_agent: server.user_agent.clone(),
        }
    }

    /// OneBot reverse-WebSocket handshake headers.
    pub fn handshake_headers(&self) -> [(&'static str, String); 4] {
        [
            ("x-self-id", self.self_id.clone()),
            ("authorization", format!("Bearer {}", self.access_token)),
            ("user-agent", self.user_agent.clone()),
            ("x-client-role", CLIENT_ROLE.to_string()),
        ]
    }
}

/// Opens downstream transports.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &DialTarget) -> Result<Transport, TransportError>;
}

/// Dials bot apps over WebSocket.
#[derive(Debug, Clone)]
pub struct WsDialer {
    buffer_size: usize,
    handshake_timeout: Duration,
}

impl WsDialer {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = self.buffer_size;
        config.write_buffer_size = self.buffer_size;
        config
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, target: &DialTarget) -> Result<Transport, TransportError> {
        let mut request = target.uri.as_str().into_client_request()?;
        for (name, value) in target.handshake_headers() {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", name, e)))?;
            request.headers_mut().insert(name, value);
        }

        let connect = tokio_tungstenite::connect_async_with_config(request, Some(self.config()), false);
        let (ws, _response) = tokio::time::timeout(self.handshake_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout(self.handshake_timeout))??;

        Ok(from_tungstenite(ws))
    }
}

/// Wrap a client WebSocket as a frame transport.
pub fn from_tungstenite<S>(ws: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (ws_sink, ws_stream) = ws.split();

    let sink = ws_sink
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| {
            future::ready(Ok::<_, TransportError>(match frame {
                Frame::Text(text) => Message::text(text),
                Frame::Binary(data) => Message::binary(data),
            }))
        });

    let stream = ws_stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
            Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })
    });

    Transport {
        sink: Box::pin(sink),
        stream: Box::pin(stream),
    }
}

/// The far end of an in-memory transport.
#[derive(Debug)]
pub struct TransportPeer {
    /// Frames the relay will read.
    pub tx: mpsc::Sender<Frame>,
    /// Frames the relay wrote.
    pub rx: mpsc::Receiver<Frame>,
}

/// Connected in-memory transport pair.
///
/// Dropping the peer's sender ends the relay's stream; dropping its receiver
/// makes relay writes fail with `Closed`.
pub fn in_memory(capacity: usize) -> (Transport, TransportPeer) {
    let (to_relay, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_relay) = mpsc::channel(capacity);

    let sink = sink::unfold(to_peer, |tx: mpsc::Sender<Frame>, frame: Frame| async move {
        tx.send(frame).await.map_err(|_| TransportError::Closed)?;
        Ok::<_, TransportError>(tx)
    });
    let stream = stream::unfold(from_peer, |mut rx: mpsc::Receiver<Frame>| async move {
        rx.recv().await.map(|frame| (Ok(frame), rx))
    });

    (
        Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        },
        TransportPeer {
            tx: to_relay,
            rx: from_relay,
        },
    )
}
