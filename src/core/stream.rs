use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::{
    connect_ws, AtomicConnectionState, ConnectionState, MessageHandler, WsConfig, WsReader,
    WsWriter,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// `{base}/ws/{stream}`
pub fn single_stream_url(base_url: &str, stream: &str) -> Result<String, ExchangeError> {
    if stream.is_empty() {
        return Err(ExchangeError::InvalidParameter(
            "stream name cannot be empty".to_string(),
        ));
    }
    Ok(format!("{}/ws/{}", base_url.trim_end_matches('/'), stream))
}

/// `{base}/stream?streams={a}/{b}/...`, preserving the given order
pub fn combined_stream_url<S: AsRef<str>>(
    base_url: &str,
    streams: &[S],
) -> Result<String, ExchangeError> {
    if streams.is_empty() || streams.iter().any(|s| s.as_ref().is_empty()) {
        return Err(ExchangeError::InvalidParameter(
            "combined stream needs at least one non-empty stream name".to_string(),
        ));
    }
    let joined = streams
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    Ok(format!(
        "{}/stream?streams={}",
        base_url.trim_end_matches('/'),
        joined
    ))
}

/// Read-only stream connection forwarding every text frame to a callback.
pub struct StreamReader {
    url: String,
    config: WsConfig,
    handler: MessageHandler,
    state: Arc<AtomicConnectionState>,
    stop: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<Result<(), ExchangeError>>>>,
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("url", &self.url)
            .field("state", &self.state.load())
            .finish_non_exhaustive()
    }
}

impl StreamReader {
    pub fn new<F>(url: String, handler: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            url,
            config: WsConfig::default(),
            handler: Arc::new(handler),
            state: Arc::new(AtomicConnectionState::default()),
            stop: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    #[instrument(skip(self, token), fields(url = %self.url))]
    pub async fn connect(&self, token: &CancellationToken) -> Result<(), ExchangeError> {
        self.state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            .map_err(|state| {
                ExchangeError::InvalidState(format!("cannot connect while {}", state))
            })?;

        let (writer, reader) = match connect_ws(&self.url, &self.config, token).await {
            Ok(halves) => halves,
            Err(e) => {
                self.state.store(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let stop = CancellationToken::new();
        *self.stop.lock().await = Some(stop.clone());
        self.state.store(ConnectionState::Connected);
        let task = tokio::spawn(forward_frames(
            writer,
            reader,
            Arc::clone(&self.handler),
            Arc::clone(&self.state),
            stop,
        ));
        *self.task.lock().await = Some(task);

        debug!("stream connected");
        Ok(())
    }

    /// Wait until the server closes the stream or `disconnect` is called.
    ///
    /// Returns the transport error that ended the stream, if any.
    pub async fn run_until_closed(&self) -> Result<(), ExchangeError> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => task.await.map_err(|e| {
                ExchangeError::ConnectionClosed(format!("stream task failed: {}", e))
            })?,
            None => Ok(()),
        }
    }

    /// Close the stream. Calling it again, or before connecting, does nothing.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn disconnect(&self) -> Result<(), ExchangeError> {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = self
                .state
                .transition(ConnectionState::Connected, ConnectionState::Closing);
            stop.cancel();
        }
        if let Some(task) = self.task.lock().await.take() {
            if let Ok(Err(e)) = task.await {
                debug!(error = %e, "stream ended with error before disconnect");
            }
        }
        self.state.store(ConnectionState::Disconnected);
        Ok(())
    }
}

async fn forward_frames(
    mut writer: WsWriter,
    mut reader: WsReader,
    handler: MessageHandler,
    state: Arc<AtomicConnectionState>,
    stop: CancellationToken,
) -> Result<(), ExchangeError> {
    let result = loop {
        let frame = tokio::select! {
            biased;
            () = stop.cancelled() => {
                if let Err(e) = writer.close().await {
                    debug!(error = %e, "close handshake failed");
                }
                break Ok(());
            }
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => handler(text),
            Some(Ok(Message::Ping(payload))) => {
                if let Err(e) = writer.send(Message::Pong(payload)).await {
                    break Err(ExchangeError::NetworkError(format!(
                        "failed to answer ping: {}",
                        e
                    )));
                }
            }
            Some(Ok(Message::Close(_))) | None => break Ok(()),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "stream transport error");
                break Err(ExchangeError::NetworkError(format!("WebSocket error: {}", e)));
            }
        }
    };

    state.store(ConnectionState::Disconnected);
    result
}
