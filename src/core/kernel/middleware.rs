use crate::core::errors::ExchangeError;
use crate::core::types::SecurityType;
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// What the transport is about to send. The query is already redacted.
#[derive(Debug, Clone)]
pub struct RequestInfo<'a> {
    pub exchange: &'a str,
    pub method: &'a Method,
    pub endpoint: &'a str,
    pub query: String,
    pub security: SecurityType,
}

#[derive(Debug)]
pub struct ResponseInfo<'a> {
    pub status: Option<u16>,
    pub body: Option<&'a str>,
    pub elapsed: Duration,
    pub error: Option<&'a ExchangeError>,
}

/// Hooks composed around every HTTP send.
///
/// Passed to the REST client at construction; there is no global handler.
pub trait HttpMiddleware: Send + Sync {
    fn on_request(&self, _request: &RequestInfo<'_>) {}

    fn on_response(&self, _request: &RequestInfo<'_>, _response: &ResponseInfo<'_>) {}
}

/// Logs requests and responses through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl HttpMiddleware for TracingMiddleware {
    fn on_request(&self, request: &RequestInfo<'_>) {
        debug!(
            exchange = %request.exchange,
            method = %request.method,
            endpoint = %request.endpoint,
            security = ?request.security,
            "sending request"
        );
        trace!(query = %request.query, "request query");
    }

    fn on_response(&self, request: &RequestInfo<'_>, response: &ResponseInfo<'_>) {
        let elapsed_ms = response.elapsed.as_millis() as u64;
        match (response.status, response.error) {
            (_, Some(error)) => warn!(
                exchange = %request.exchange,
                endpoint = %request.endpoint,
                elapsed_ms,
                %error,
                "request failed"
            ),
            (Some(status), None) => debug!(
                exchange = %request.exchange,
                endpoint = %request.endpoint,
                status,
                elapsed_ms,
                "received response"
            ),
            (None, None) => {}
        }
        if let Some(body) = response.body {
            trace!(body = %body, "response body");
        }
    }
}

/// Replace the `signature` value in a query string so it never reaches logs.
pub fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("signature", _)) => "signature=[REDACTED]".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
