use crate::core::config::ConfigError;
use crate::core::errors::ExchangeError;
use crate::core::kernel::middleware::{redact_query, HttpMiddleware, RequestInfo, ResponseInfo};
use crate::core::kernel::params::ParameterSet;
use crate::core::kernel::request::SignedRequestBuilder;
use crate::core::kernel::signer::Credential;
use crate::core::types::SecurityType;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

/// Header the exchange reads the API key from. Venues expecting a generic
/// name such as `X-API-KEY` set it with [`RestClientConfig::with_api_key_header`].
pub const DEFAULT_API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Where the (signed) parameter string travels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamPlacement {
    #[default]
    Query,
    /// `application/x-www-form-urlencoded` request body
    Body,
}

/// One REST call, independent of any transport.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub endpoint: String,
    pub params: ParameterSet,
    pub security: SecurityType,
    /// Per-call override of the configured default `recvWindow`
    pub recv_window: Option<u64>,
    pub placement: ParamPlacement,
    /// Extra headers sent as-is; the API key header is added separately
    pub headers: HeaderMap,
}

impl RestRequest {
    pub fn new(method: Method, endpoint: impl Into<String>, security: SecurityType) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: ParameterSet::new(),
            security,
            recv_window: None,
            placement: ParamPlacement::Query,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn params(mut self, params: ParameterSet) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.recv_window = recv_window;
        self
    }

    #[must_use]
    pub fn placement(mut self, placement: ParamPlacement) -> Self {
        self.placement = placement;
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// REST transport returning raw response bodies.
///
/// Response bodies are returned untouched; parsing them is the caller's
/// choice. Nothing here retries implicitly.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send a request and return the raw body of a 2xx response
    async fn send_request(&self, request: &RestRequest) -> Result<String, ExchangeError>;

    /// Send a request, giving up with `Cancelled` once `token` fires.
    ///
    /// Dropping the in-flight request aborts the underlying connection.
    async fn send_cancellable(
        &self,
        request: &RestRequest,
        token: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(ExchangeError::Cancelled(format!(
                "{} {}",
                request.method, request.endpoint
            ))),
            result = self.send_request(request) => result,
        }
    }

    async fn get(
        &self,
        endpoint: &str,
        params: ParameterSet,
        security: SecurityType,
    ) -> Result<String, ExchangeError> {
        self.send_request(&RestRequest::new(Method::GET, endpoint, security).params(params))
            .await
    }

    async fn post(
        &self,
        endpoint: &str,
        params: ParameterSet,
        security: SecurityType,
    ) -> Result<String, ExchangeError> {
        self.send_request(&RestRequest::new(Method::POST, endpoint, security).params(params))
            .await
    }

    async fn put(
        &self,
        endpoint: &str,
        params: ParameterSet,
        security: SecurityType,
    ) -> Result<String, ExchangeError> {
        self.send_request(&RestRequest::new(Method::PUT, endpoint, security).params(params))
            .await
    }

    async fn delete(
        &self,
        endpoint: &str,
        params: ParameterSet,
        security: SecurityType,
    ) -> Result<String, ExchangeError> {
        self.send_request(&RestRequest::new(Method::DELETE, endpoint, security).params(params))
            .await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Header carrying the API key on keyed and signed calls
    pub api_key_header: String,
    /// `recvWindow` applied to signed calls without their own override
    pub default_recv_window: Option<u64>,
    /// Attempts after the first one made by `send_with_retry`
    pub max_retries: u32,
    /// Base delay of the exponential backoff used by `send_with_retry`
    pub retry_base_delay_ms: u64,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: concat!("mbx-connector/", env!("CARGO_PKG_VERSION")).to_string(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            default_recv_window: None,
            max_retries: 0,
            retry_base_delay_ms: 100,
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_api_key_header(mut self, header: String) -> Self {
        self.api_key_header = header;
        self
    }

    pub fn with_recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.default_recv_window = recv_window;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_base_delay_ms = delay_ms;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    credential: Option<Arc<Credential>>,
    middleware: Vec<Arc<dyn HttpMiddleware>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            credential: None,
            middleware: Vec::new(),
        }
    }

    /// Set the credential used for keyed and signed requests
    pub fn with_credential(mut self, credential: Arc<Credential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Add a hook around every send; hooks run in the order they were added
    pub fn with_middleware(mut self, middleware: Arc<dyn HttpMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ConfigError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            credential: self.credential,
            middleware: self.middleware,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    credential: Option<Arc<Credential>>,
    middleware: Vec<Arc<dyn HttpMiddleware>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_credential", &self.credential.is_some())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Send with exponential backoff on `NetworkError` only.
    ///
    /// Every attempt is re-timestamped and re-signed. Exchange rejections
    /// (`TransportError`) and local errors are returned immediately.
    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, endpoint = %request.endpoint, max_retries = self.config.max_retries))]
    pub async fn send_with_retry(&self, request: &RestRequest) -> Result<String, ExchangeError> {
        // base, 2*base, 4*base, ...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_base_delay_ms / 2).max(1))
            .max_delay(Duration::from_secs(10))
            .take(self.config.max_retries as usize);

        RetryIf::spawn(
            strategy,
            || self.make_request(request),
            |e: &ExchangeError| e.is_retryable(),
        )
        .await
    }

    fn build_url(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        }
    }

    fn credential_for(&self, security: SecurityType) -> Result<Option<&Credential>, ExchangeError> {
        if !security.requires_api_key() {
            return Ok(None);
        }
        self.credential
            .as_deref()
            .map(Some)
            .ok_or(ExchangeError::AuthenticationRequired)
    }

    /// Canonical parameter string, signed when the endpoint requires it
    fn encode_params(&self, request: &RestRequest) -> Result<String, ExchangeError> {
        match self.credential_for(request.security)? {
            Some(credential) if request.security.requires_signature() => {
                SignedRequestBuilder::new(credential)
                    .recv_window(request.recv_window.or(self.config.default_recv_window))
                    .sign(&request.params)?
                    .query_string()
            }
            _ => request.params.to_query_string(),
        }
    }

    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<String, ExchangeError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ExchangeError::TransportError {
                status: status.as_u16(),
                body,
            })
        }
    }

    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, method = %request.method, endpoint = %request.endpoint))]
    async fn make_request(&self, request: &RestRequest) -> Result<String, ExchangeError> {
        // Signing happens here, per attempt, never ahead of time
        let encoded = self.encode_params(request)?;

        let info = RequestInfo {
            exchange: &self.config.exchange_name,
            method: &request.method,
            endpoint: &request.endpoint,
            query: redact_query(&encoded),
            security: request.security,
        };

        let mut builder = match request.placement {
            ParamPlacement::Query => self
                .client
                .request(request.method.clone(), self.build_url(&request.endpoint, &encoded)),
            ParamPlacement::Body => self
                .client
                .request(request.method.clone(), self.build_url(&request.endpoint, ""))
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(encoded),
        };

        if !request.headers.is_empty() {
            builder = builder.headers(request.headers.clone());
        }
        if let Some(credential) = self.credential_for(request.security)? {
            builder = builder.header(self.config.api_key_header.as_str(), credential.api_key());
        }

        for middleware in &self.middleware {
            middleware.on_request(&info);
        }

        let started = Instant::now();
        let (status, result) = match builder.send().await {
            Ok(response) => (
                Some(response.status().as_u16()),
                self.handle_response(response).await,
            ),
            Err(e) if e.is_timeout() => (
                None,
                Err(ExchangeError::NetworkError(format!("Request timed out: {}", e))),
            ),
            Err(e) => (
                None,
                Err(ExchangeError::NetworkError(format!("Request failed: {}", e))),
            ),
        };

        let response_info = match &result {
            Ok(body) => ResponseInfo {
                status,
                body: Some(body.as_str()),
                elapsed: started.elapsed(),
                error: None,
            },
            Err(error) => ResponseInfo {
                status: error.status().or(status),
                body: None,
                elapsed: started.elapsed(),
                error: Some(error),
            },
        };
        for middleware in &self.middleware {
            middleware.on_response(&info, &response_info);
        }

        trace!(success = result.is_ok(), "request complete");
        result
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn send_request(&self, request: &RestRequest) -> Result<String, ExchangeError> {
        self.make_request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(credential: Option<Arc<Credential>>) -> ReqwestRest {
        let config = RestClientConfig::new("https://api.example.com".to_string(), "test".to_string());
        let mut builder = RestClientBuilder::new(config);
        if let Some(credential) = credential {
            builder = builder.with_credential(credential);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_build_url() {
        let rest = client(None);
        assert_eq!(
            rest.build_url("/api/v3/depth", "symbol=BTCUSDT"),
            "https://api.example.com/api/v3/depth?symbol=BTCUSDT"
        );
        assert_eq!(
            rest.build_url("/api/v3/ping", ""),
            "https://api.example.com/api/v3/ping"
        );
    }

    #[test]
    fn test_unsigned_params_are_not_signed() {
        let rest = client(Some(Arc::new(Credential::hmac("key", "secret"))));
        let request = RestRequest::new(Method::GET, "/api/v3/depth", SecurityType::None)
            .params(ParameterSet::new().with("symbol", "BTCUSDT"));
        assert_eq!(rest.encode_params(&request).unwrap(), "symbol=BTCUSDT");
    }

    #[test]
    fn test_signed_params_end_with_signature() {
        let rest = client(Some(Arc::new(Credential::hmac("key", "secret"))));
        let request = RestRequest::new(Method::GET, "/api/v3/account", SecurityType::Signed)
            .recv_window(Some(5000));
        let encoded = rest.encode_params(&request).unwrap();
        assert!(encoded.starts_with("recvWindow=5000&timestamp="));
        let (_, signature) = encoded.rsplit_once("&signature=").unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_signed_without_credential_is_rejected_before_io() {
        let rest = client(None);
        let request = RestRequest::new(Method::GET, "/api/v3/account", SecurityType::Signed);
        let err = rest.encode_params(&request).unwrap_err();
        assert!(matches!(err, ExchangeError::AuthenticationRequired));
        assert!(!err.was_sent());
    }

    #[test]
    fn test_default_config() {
        let config = RestClientConfig::new("https://api.example.com".to_string(), "x".to_string());
        assert_eq!(config.api_key_header, "X-MBX-APIKEY");
        assert_eq!(config.max_retries, 0);
        assert!(config.default_recv_window.is_none());
    }
}
