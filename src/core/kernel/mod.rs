//! Exchange-agnostic transport kernel.
//!
//! Everything an endpoint method needs to reach the exchange lives here:
//!
//! - `params`: parameter values and the canonical query string
//! - `signer`: HMAC, RSA and Ed25519 signature strategies and the `Credential`
//! - `request`: timestamp, `recvWindow` and signature attachment
//! - `middleware`: hooks composed around every HTTP send
//! - `rest`: the `RestClient` transport returning raw bodies
//! - `ws` / `ws_api`: connection state and the correlated WebSocket API channel
//!
//! Responses are returned as raw strings. Parsing them is left to the caller.
//!
//! ```rust,no_run
//! use mbx_connector::core::kernel::*;
//! use mbx_connector::core::types::SecurityType;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), mbx_connector::ExchangeError> {
//! let credential = Arc::new(Credential::hmac("api_key", "secret_key"));
//! let rest = RestClientBuilder::new(RestClientConfig::new(
//!     "https://testnet.binance.vision".to_string(),
//!     "binance".to_string(),
//! ))
//! .with_credential(credential)
//! .with_middleware(Arc::new(TracingMiddleware))
//! .build()?;
//!
//! let params = ParameterSet::new().with("symbol", "BTCUSDT");
//! let body = rest.get("/api/v3/openOrders", params, SecurityType::Signed).await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```

pub mod middleware;
pub mod params;
pub mod request;
pub mod rest;
pub mod signer;
pub mod ws;
pub mod ws_api;

pub use middleware::{redact_query, HttpMiddleware, RequestInfo, ResponseInfo, TracingMiddleware};
pub use params::{ArrayEncoding, ParamValue, ParameterSet};
pub use request::{sign_ws_params, ws_params, SignedQuery, SignedRequestBuilder};
pub use rest::{
    ParamPlacement, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, RestRequest,
};
pub use signer::{
    get_timestamp, Credential, Ed25519Signer, HmacSigner, RsaSigner, SignatureStrategy, Signer,
};
pub use ws::{ConnectionState, MessageHandler, WsConfig};
pub use ws_api::{WsApiClient, WsApiClientBuilder, WsApiConfig, WsApiRequest};
