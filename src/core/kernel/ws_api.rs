use crate::core::errors::ExchangeError;
use crate::core::kernel::params::ParameterSet;
use crate::core::kernel::request::{sign_ws_params, ws_params, API_KEY_PARAM};
use crate::core::kernel::signer::{get_timestamp, Credential};
use crate::core::kernel::ws::{
    connect_ws, AtomicConnectionState, ConnectionState, MessageHandler, WsConfig, WsReader,
    WsWriter,
};
use crate::core::types::SecurityType;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

type ResponseSender = oneshot::Sender<Result<String, ExchangeError>>;

/// How long a late response to an abandoned request is still recognised
const ABANDONED_TTL: Duration = Duration::from_secs(60);
const MAX_ABANDONED: usize = 1024;

/// One request over the WebSocket API.
#[derive(Debug, Clone)]
pub struct WsApiRequest {
    pub method: String,
    pub params: ParameterSet,
    /// Caller-chosen correlation id; generated when `None`
    pub id: Option<String>,
    pub security: SecurityType,
    pub recv_window: Option<u64>,
    /// Overrides `WsConfig::request_timeout_ms` for this request
    pub timeout: Option<Duration>,
}

impl WsApiRequest {
    pub fn new(method: impl Into<String>, security: SecurityType) -> Self {
        Self {
            method: method.into(),
            params: ParameterSet::new(),
            id: None,
            security,
            recv_window: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn params(mut self, params: ParameterSet) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.recv_window = recv_window;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct WsApiConfig {
    pub url: String,
    pub exchange_name: String,
    pub ws: WsConfig,
    /// `recvWindow` for signed requests without their own override
    pub default_recv_window: Option<u64>,
}

impl WsApiConfig {
    pub fn new(url: String, exchange_name: String) -> Self {
        Self {
            url,
            exchange_name,
            ws: WsConfig::default(),
            default_recv_window: None,
        }
    }

    pub fn with_ws_config(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }

    pub fn with_recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.default_recv_window = recv_window;
        self
    }
}

pub struct WsApiClientBuilder {
    config: WsApiConfig,
    credential: Option<Arc<Credential>>,
    handler: Option<MessageHandler>,
}

impl WsApiClientBuilder {
    pub fn new(config: WsApiConfig) -> Self {
        Self {
            config,
            credential: None,
            handler: None,
        }
    }

    pub fn config(&self) -> &WsApiConfig {
        &self.config
    }

    pub fn with_credential(mut self, credential: Arc<Credential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Callback for push frames and responses nobody is waiting on
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> WsApiClient {
        WsApiClient {
            inner: Arc::new(Shared {
                config: self.config,
                credential: self.credential,
                handler: self.handler,
                state: AtomicConnectionState::default(),
                writer: Mutex::new(None),
                reader_task: Mutex::new(None),
                pending: DashMap::new(),
                abandoned: DashMap::new(),
                session: format!("{:08x}", rand::random::<u32>()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

struct Shared {
    config: WsApiConfig,
    credential: Option<Arc<Credential>>,
    handler: Option<MessageHandler>,
    state: AtomicConnectionState,
    writer: Mutex<Option<WsWriter>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    pending: DashMap<String, ResponseSender>,
    // ids whose caller gave up, with when; their late responses are dropped
    abandoned: DashMap<String, Instant>,
    session: String,
    next_id: AtomicU64,
}

/// Request/response channel over one persistent WebSocket.
///
/// Cheap to clone; clones share the connection. Any number of tasks may
/// call [`WsApiClient::send_request`] concurrently. Responses are matched
/// to callers by correlation id, so they may arrive in any order.
#[derive(Clone)]
pub struct WsApiClient {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for WsApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsApiClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.inner.state.load())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

/// Removes the pending entry when the waiting caller goes away for any reason.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.pending.remove(&self.id).is_some() {
            self.shared.abandon(self.id.clone());
        }
    }
}

#[derive(Deserialize)]
struct IdProbe {
    #[serde(default)]
    id: Option<Value>,
}

/// Correlation id of an inbound frame; numeric ids are compared as strings.
fn frame_id(text: &str) -> Option<String> {
    match serde_json::from_str::<IdProbe>(text).ok()?.id? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl Shared {
    fn dispatch(&self, text: String) {
        if let Some(id) = frame_id(&text) {
            if let Some((_, sender)) = self.pending.remove(&id) {
                trace!(%id, "response matched pending request");
                let _ = sender.send(Ok(text));
                return;
            }
            if self.abandoned.remove(&id).is_some() {
                debug!(%id, "dropping late response for abandoned request");
                return;
            }
        }

        match &self.handler {
            Some(handler) => handler(text),
            None => trace!("no message handler registered, frame dropped"),
        }
    }

    /// Remember an id whose caller stopped waiting. Expired entries are
    /// pruned first, then the oldest one is evicted once the set is full.
    fn abandon(&self, id: String) {
        let now = Instant::now();
        self.abandoned
            .retain(|_, at| now.duration_since(*at) < ABANDONED_TTL);
        if self.abandoned.len() >= MAX_ABANDONED {
            let oldest = self
                .abandoned
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.abandoned.remove(&oldest);
            }
        }
        self.abandoned.insert(id, now);
    }

    fn fail_pending(&self, reason: &str) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(Err(ExchangeError::ConnectionClosed(reason.to_string())));
                failed += 1;
            }
        }
        self.abandoned.clear();
        failed
    }

    async fn transport_closed(&self, reason: &str) {
        if self.state.load().is_connected() {
            self.writer.lock().await.take();
            if self
                .state
                .transition(ConnectionState::Connected, ConnectionState::Disconnected)
                .is_ok()
            {
                warn!(
                    exchange = %self.config.exchange_name,
                    reason,
                    "WebSocket API connection lost"
                );
            }
        }
        // After the writer is gone nothing new can be transmitted
        let failed = self.fail_pending(reason);
        debug!(failed_requests = failed, "pending requests failed");
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: WsReader) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => shared.dispatch(text),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => shared.dispatch(text),
                Err(e) => warn!(error = %e, "discarding non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Ping(payload))) => {
                if let Some(writer) = shared.writer.lock().await.as_mut() {
                    if let Err(e) = writer.send(Message::Pong(payload)).await {
                        warn!(error = %e, "failed to answer ping");
                    }
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || "closed by server".to_string(),
                    |f| format!("closed by server: {} {}", u16::from(f.code), f.reason),
                );
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("transport error: {}", e),
            None => break "stream ended".to_string(),
        }
    };
    shared.transport_closed(&reason).await;
}

impl WsApiClient {
    pub fn builder(config: WsApiConfig) -> WsApiClientBuilder {
        WsApiClientBuilder::new(config)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Requests currently waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Open the socket; resolves once the handshake has completed.
    ///
    /// Fails with `InvalidState` while already connecting or connected.
    #[instrument(skip(self, token), fields(exchange = %self.inner.config.exchange_name, url = %self.inner.config.url))]
    pub async fn connect(&self, token: &CancellationToken) -> Result<(), ExchangeError> {
        let shared = &self.inner;
        shared
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            .map_err(|state| {
                ExchangeError::InvalidState(format!("cannot connect while {}", state))
            })?;

        let (writer, reader) = match connect_ws(&shared.config.url, &shared.config.ws, token).await
        {
            Ok(halves) => halves,
            Err(e) => {
                shared.state.store(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        *shared.writer.lock().await = Some(writer);
        shared.state.store(ConnectionState::Connected);
        let task = tokio::spawn(read_loop(Arc::clone(shared), reader));
        if let Some(stale) = shared.reader_task.lock().await.replace(task) {
            stale.abort();
        }

        debug!("WebSocket API connected");
        Ok(())
    }

    fn next_id(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.inner.session, n)
    }

    fn build_params(
        &self,
        request: &WsApiRequest,
    ) -> Result<serde_json::Map<String, Value>, ExchangeError> {
        if !request.security.requires_api_key() {
            return ws_params(&request.params);
        }
        let credential = self
            .inner
            .credential
            .as_deref()
            .ok_or(ExchangeError::AuthenticationRequired)?;

        if request.security.requires_signature() {
            sign_ws_params(
                credential,
                &request.params,
                request.recv_window.or(self.inner.config.default_recv_window),
                get_timestamp()?,
            )
        } else {
            let mut params = ws_params(&request.params)?;
            params.insert(
                API_KEY_PARAM.to_string(),
                Value::String(credential.api_key().to_string()),
            );
            Ok(params)
        }
    }

    /// Send a request and wait for the response frame carrying its id.
    ///
    /// Returns the raw response frame. Resolves with `Cancelled` when
    /// `token` fires, `Timeout` when the deadline passes, and
    /// `ConnectionClosed` when the channel drops first. Cancellation only
    /// affects this request; the channel stays open.
    #[instrument(skip(self, request, token), fields(exchange = %self.inner.config.exchange_name, method = %request.method))]
    pub async fn send_request(
        &self,
        request: WsApiRequest,
        token: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let shared = &*self.inner;
        let state = shared.state.load();
        if !state.is_connected() {
            return Err(ExchangeError::InvalidState(format!(
                "cannot send while {}",
                state
            )));
        }

        let id = match &request.id {
            Some(id) if id.is_empty() => {
                return Err(ExchangeError::InvalidParameter(
                    "request id cannot be empty".to_string(),
                ))
            }
            Some(id) => id.clone(),
            None => self.next_id(),
        };
        let params = self.build_params(&request)?;
        let frame = serde_json::to_string(&json!({
            "id": id,
            "method": request.method,
            "params": params,
        }))?;

        // Registered before transmitting so an early response always finds it
        let (sender, receiver) = oneshot::channel();
        match shared.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(ExchangeError::InvalidParameter(format!(
                    "request id '{}' is already pending",
                    id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(sender);
            }
        }
        let _guard = PendingGuard {
            shared,
            id: id.clone(),
        };

        let deadline = request
            .timeout
            .or_else(|| shared.config.ws.request_timeout_ms.map(Duration::from_millis));
        let expired = async {
            match deadline {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending().await,
            }
        };

        let exchange = async {
            let mut writer = shared.writer.lock().await;
            let sent = match writer.as_mut() {
                Some(sink) => sink.send(Message::Text(frame)).await.map_err(|e| {
                    ExchangeError::NetworkError(format!("failed to send request: {}", e))
                }),
                None => Err(ExchangeError::ConnectionClosed(
                    "connection is not open".to_string(),
                )),
            };
            drop(writer);
            if let Err(e) = sent {
                // Nothing reached the server, so no response can follow
                shared.pending.remove(&id);
                return Err(e);
            }
            trace!(%id, "request transmitted");

            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::ConnectionClosed(
                    "connection dropped before a response arrived".to_string(),
                )),
            }
        };

        tokio::select! {
            biased;
            () = token.cancelled() => Err(ExchangeError::Cancelled(format!("request {}", id))),
            () = expired => Err(ExchangeError::Timeout(format!("no response to request {}", id))),
            result = exchange => result,
        }
    }

    /// Close the channel, failing every pending request with `ConnectionClosed`.
    ///
    /// A no-op when already disconnected. If `token` fires during the close
    /// handshake the socket is dropped without waiting for the server.
    #[instrument(skip(self, token), fields(exchange = %self.inner.config.exchange_name))]
    pub async fn disconnect(&self, token: &CancellationToken) -> Result<(), ExchangeError> {
        let shared = &self.inner;
        match shared
            .state
            .transition(ConnectionState::Connected, ConnectionState::Closing)
        {
            Ok(()) => {}
            Err(ConnectionState::Disconnected) => return Ok(()),
            Err(state) => {
                return Err(ExchangeError::InvalidState(format!(
                    "cannot disconnect while {}",
                    state
                )))
            }
        }

        if let Some(mut writer) = shared.writer.lock().await.take() {
            let close = tokio::time::timeout(
                Duration::from_millis(shared.config.ws.connect_timeout_ms),
                writer.close(),
            );
            tokio::select! {
                biased;
                () = token.cancelled() => debug!("close handshake cancelled"),
                result = close => match result {
                    Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
                    Err(_) => debug!("close handshake timed out"),
                    Ok(Ok(())) => {}
                },
            }
        }

        if let Some(task) = shared.reader_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        let failed = shared.fail_pending("connection closed by client");
        shared.state.store(ConnectionState::Disconnected);
        debug!(failed_requests = failed, "WebSocket API disconnected");
        Ok(())
    }
}
