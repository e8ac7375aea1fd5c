use crate::core::errors::ExchangeError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWriter = SplitSink<WsStream, Message>;
pub type WsReader = SplitStream<WsStream>;

/// Callback receiving raw text frames.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// WebSocket connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Default wait for a correlated response; `None` waits until the
    /// channel closes or the caller cancels
    pub request_timeout_ms: Option<u64>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: None,
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }
}

/// Lifecycle of a WebSocket channel.
///
/// `Disconnected -> Connecting -> Connected -> Closing -> Disconnected`.
/// A transport close or error moves `Connected` straight to `Disconnected`.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
}

impl ConnectionState {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Closing,
            _ => Self::Disconnected,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state shared between a channel's callers and its reader task.
#[derive(Debug, Default)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Move from `current` to `new` only if the state is still `current`.
    ///
    /// Returns the state observed on failure.
    pub fn transition(
        &self,
        current: ConnectionState,
        new: ConnectionState,
    ) -> Result<(), ConnectionState> {
        self.0
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }
}

/// Open a socket and complete the handshake, honouring timeout and cancellation.
#[instrument(skip(config, token), fields(url = %url))]
pub async fn connect_ws(
    url: &str,
    config: &WsConfig,
    token: &CancellationToken,
) -> Result<(WsWriter, WsReader), ExchangeError> {
    let timeout = Duration::from_millis(config.connect_timeout_ms);

    let handshake = tokio::select! {
        biased;
        () = token.cancelled() => {
            return Err(ExchangeError::Cancelled(format!("connect to {}", url)));
        }
        result = tokio::time::timeout(timeout, connect_async(url)) => result,
    };

    let (stream, response) = handshake
        .map_err(|_| ExchangeError::Timeout(format!("WebSocket connect to {} timed out", url)))?
        .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

    debug!(status = %response.status(), "WebSocket handshake complete");
    Ok(stream.split())
}
