use crate::core::config::validate_recv_window;
use crate::core::errors::ExchangeError;
use crate::core::kernel::params::{ParamValue, ParameterSet};
use crate::core::kernel::signer::{get_timestamp, Credential};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

pub const TIMESTAMP_PARAM: &str = "timestamp";
pub const RECV_WINDOW_PARAM: &str = "recvWindow";
pub const SIGNATURE_PARAM: &str = "signature";
pub const API_KEY_PARAM: &str = "apiKey";

/// A query string ready for transmission, plus the exact bytes that were signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuery {
    payload: String,
    signature: String,
    timestamp: u64,
}

impl SignedQuery {
    /// The canonical query string the signature covers
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Payload with `signature` appended as the final parameter.
    ///
    /// The payload prefix is reused verbatim, so what is transmitted is
    /// byte-identical to what was signed.
    pub fn query_string(&self) -> Result<String, ExchangeError> {
        let encoded = serde_urlencoded::to_string(&[(SIGNATURE_PARAM, self.signature.as_str())])
            .map_err(|e| ExchangeError::InvalidParameter(format!("failed to encode signature: {}", e)))?;
        if self.payload.is_empty() {
            Ok(encoded)
        } else {
            Ok(format!("{}&{}", self.payload, encoded))
        }
    }
}

/// Attaches `recvWindow`, `timestamp` and `signature` to a parameter set.
///
/// Field order on the wire: caller parameters, then `recvWindow` (when
/// given), then `timestamp`, then `signature`.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequestBuilder<'a> {
    credential: &'a Credential,
    recv_window: Option<u64>,
}

impl<'a> SignedRequestBuilder<'a> {
    pub fn new(credential: &'a Credential) -> Self {
        Self {
            credential,
            recv_window: None,
        }
    }

    /// Override the exchange's server-side default `recvWindow`
    #[must_use]
    pub fn recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.recv_window = recv_window;
        self
    }

    /// Sign with the current wall-clock time.
    ///
    /// Call this once per transmission attempt: a retried request needs a
    /// fresh timestamp or the exchange rejects it as outside `recvWindow`.
    pub fn sign(&self, params: &ParameterSet) -> Result<SignedQuery, ExchangeError> {
        self.sign_at(params, get_timestamp()?)
    }

    pub fn sign_at(
        &self,
        params: &ParameterSet,
        timestamp: u64,
    ) -> Result<SignedQuery, ExchangeError> {
        let mut assembled = prepare_params(params, self.recv_window)?;
        assembled.insert(TIMESTAMP_PARAM, timestamp);

        let payload = assembled.to_query_string()?;
        let signature = self.credential.sign(payload.as_bytes())?;
        trace!(payload_len = payload.len(), "signed request payload");

        Ok(SignedQuery {
            payload,
            signature,
            timestamp,
        })
    }
}

fn prepare_params(
    params: &ParameterSet,
    recv_window: Option<u64>,
) -> Result<ParameterSet, ExchangeError> {
    for reserved in [TIMESTAMP_PARAM, SIGNATURE_PARAM] {
        if params.contains(reserved) {
            return Err(ExchangeError::InvalidParameter(format!(
                "'{}' is injected by the signer and cannot be supplied",
                reserved
            )));
        }
    }

    let mut assembled = params.clone();
    if let Some(window) = recv_window {
        validate_recv_window(window)
            .map_err(|e| ExchangeError::InvalidParameter(e.to_string()))?;
        assembled.remove(RECV_WINDOW_PARAM);
        assembled.insert(RECV_WINDOW_PARAM, window);
    } else if let Some(value) = assembled.get(RECV_WINDOW_PARAM) {
        let window = value
            .encode()?
            .parse::<u64>()
            .map_err(|e| ExchangeError::InvalidParameter(format!("invalid recvWindow: {}", e)))?;
        validate_recv_window(window)
            .map_err(|e| ExchangeError::InvalidParameter(e.to_string()))?;
    }
    Ok(assembled)
}

/// Build a signed WebSocket API `params` object.
///
/// The WebSocket API signs every parameter, `apiKey` and `timestamp`
/// included, sorted by name, with values unencoded; `signature` is then
/// added to the object.
pub fn sign_ws_params(
    credential: &Credential,
    params: &ParameterSet,
    recv_window: Option<u64>,
    timestamp: u64,
) -> Result<Map<String, Value>, ExchangeError> {
    let mut assembled = prepare_params(params, recv_window)?;
    if assembled.contains(API_KEY_PARAM) {
        return Err(ExchangeError::InvalidParameter(format!(
            "'{}' is injected by the signer and cannot be supplied",
            API_KEY_PARAM
        )));
    }
    assembled.insert(API_KEY_PARAM, credential.api_key());
    assembled.insert(TIMESTAMP_PARAM, timestamp);

    let sorted: BTreeMap<&str, &ParamValue> = assembled.iter().collect();
    let payload = sorted
        .iter()
        .map(|(name, value)| -> Result<String, ExchangeError> {
            Ok(format!("{}={}", name, value.encode()?))
        })
        .collect::<Result<Vec<_>, _>>()?
        .join("&");
    let signature = credential.sign(payload.as_bytes())?;

    let mut object = Map::new();
    for (name, value) in sorted {
        object.insert(name.to_string(), value.to_json()?);
    }
    object.insert(SIGNATURE_PARAM.to_string(), Value::String(signature));
    Ok(object)
}

/// Unsigned WebSocket API `params` object.
pub fn ws_params(params: &ParameterSet) -> Result<Map<String, Value>, ExchangeError> {
    let mut object = Map::new();
    for (name, value) in params.iter() {
        if name.is_empty() {
            return Err(ExchangeError::InvalidParameter(
                "parameter name cannot be empty".to_string(),
            ));
        }
        object.insert(name.to_string(), value.to_json()?);
    }
    Ok(object)
}
