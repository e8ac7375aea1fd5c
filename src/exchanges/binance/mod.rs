pub mod account;
pub mod client;
pub mod margin;
pub mod market;
pub mod streams;
pub mod trade;
pub mod user_data;
pub mod ws_api;

use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Credential, ReqwestRest, RestClientBuilder, RestClientConfig, TracingMiddleware,
    WsApiClientBuilder, WsApiConfig, WsConfig,
};
use std::sync::Arc;

// Re-export main types for easier importing
pub use client::{BinanceClient, OrderRef};
pub use market::TimeRange;
pub use streams::{MarketDataStream, UserDataStream};
pub use trade::NewOrderRequest;
pub use ws_api::BinanceWsApi;

pub const EXCHANGE_NAME: &str = "binance";

pub const REST_URL: &str = "https://api.binance.com";
pub const REST_TESTNET_URL: &str = "https://testnet.binance.vision";
pub const WS_API_URL: &str = "wss://ws-api.binance.com:443/ws-api/v3";
pub const WS_API_TESTNET_URL: &str = "wss://testnet.binance.vision/ws-api/v3";
pub const STREAM_URL: &str = "wss://stream.binance.com:9443";
pub const STREAM_TESTNET_URL: &str = "wss://testnet.binance.vision";

/// Pick an explicit override, else the testnet or production default
fn resolve_url(override_url: Option<&String>, testnet: bool, testnet_url: &str, url: &str) -> String {
    match override_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None if testnet => testnet_url.to_string(),
        None => url.to_string(),
    }
}

pub fn rest_url(config: &ExchangeConfig) -> String {
    resolve_url(config.base_url.as_ref(), config.testnet, REST_TESTNET_URL, REST_URL)
}

pub fn ws_api_url(config: &ExchangeConfig) -> String {
    resolve_url(
        config.ws_api_url.as_ref(),
        config.testnet,
        WS_API_TESTNET_URL,
        WS_API_URL,
    )
}

pub fn stream_url(config: &ExchangeConfig) -> String {
    resolve_url(
        config.stream_url.as_ref(),
        config.testnet,
        STREAM_TESTNET_URL,
        STREAM_URL,
    )
}

fn credential(config: &ExchangeConfig) -> Result<Option<Arc<Credential>>, ExchangeError> {
    Ok(Credential::from_config(config)?.map(Arc::new))
}

/// REST transport configured from `config`, with tracing middleware installed
pub fn build_rest_client(config: &ExchangeConfig) -> Result<ReqwestRest, ExchangeError> {
    let rest_config = RestClientConfig::new(rest_url(config), EXCHANGE_NAME.to_string())
        .with_timeout(config.timeout_seconds)
        .with_recv_window(config.recv_window);

    let mut builder =
        RestClientBuilder::new(rest_config).with_middleware(Arc::new(TracingMiddleware));
    if let Some(credential) = credential(config)? {
        builder = builder.with_credential(credential);
    }
    builder.build()
}

pub fn build_client(config: &ExchangeConfig) -> Result<BinanceClient<ReqwestRest>, ExchangeError> {
    Ok(BinanceClient::new(build_rest_client(config)?))
}

/// Builder for the WebSocket API channel; add a push handler before building
pub fn ws_api_builder(config: &ExchangeConfig) -> Result<WsApiClientBuilder, ExchangeError> {
    let ws_config = WsApiConfig::new(ws_api_url(config), EXCHANGE_NAME.to_string())
        .with_ws_config(
            WsConfig::default()
                .with_connect_timeout_ms(config.timeout_seconds.saturating_mul(1000)),
        )
        .with_recv_window(config.recv_window);

    let mut builder = WsApiClientBuilder::new(ws_config);
    if let Some(credential) = credential(config)? {
        builder = builder.with_credential(credential);
    }
    Ok(builder)
}

pub fn build_ws_api(config: &ExchangeConfig) -> Result<BinanceWsApi, ExchangeError> {
    Ok(BinanceWsApi::new(ws_api_builder(config)?.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_resolution() {
        let config = ExchangeConfig::read_only();
        assert_eq!(rest_url(&config), REST_URL);
        assert_eq!(ws_api_url(&config), WS_API_URL);
        assert_eq!(stream_url(&config), STREAM_URL);

        let testnet = ExchangeConfig::read_only().testnet(true);
        assert_eq!(rest_url(&testnet), REST_TESTNET_URL);
        assert_eq!(ws_api_url(&testnet), WS_API_TESTNET_URL);
        assert_eq!(stream_url(&testnet), STREAM_TESTNET_URL);

        let custom = ExchangeConfig::read_only()
            .testnet(true)
            .base_url("http://127.0.0.1:8080/".to_string());
        assert_eq!(rest_url(&custom), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_build_read_only_client() {
        let client = build_client(&ExchangeConfig::read_only()).unwrap();
        assert_eq!(client.rest().config().base_url, REST_URL);
        assert_eq!(client.rest().config().exchange_name, "binance");
    }

    #[test]
    fn test_build_with_bad_key_material_fails() {
        let config = ExchangeConfig::new("key".to_string(), "not a pem".to_string())
            .key_type(crate::core::config::KeyType::Rsa);
        assert!(matches!(
            build_client(&config),
            Err(ExchangeError::SigningError(_))
        ));
    }

    #[test]
    fn test_build_ws_api() {
        let api = build_ws_api(&ExchangeConfig::new("key".to_string(), "secret".to_string()))
            .unwrap();
        assert_eq!(api.channel().url(), WS_API_URL);
        assert!(!api.channel().is_connected());
    }

    #[test]
    fn test_ws_connect_timeout_follows_config() {
        let builder = ws_api_builder(&ExchangeConfig::read_only().timeout_seconds(5)).unwrap();
        assert_eq!(builder.config().ws.connect_timeout_ms, 5_000);

        let builder = ws_api_builder(&ExchangeConfig::read_only().timeout_seconds(u64::MAX)).unwrap();
        assert_eq!(builder.config().ws.connect_timeout_ms, u64::MAX);
    }
}
