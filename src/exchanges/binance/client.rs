use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParamValue, ParameterSet, RestClient, RestRequest};
use crate::core::types::SecurityType;
use reqwest::Method;

/// Spot REST endpoints, one method per endpoint.
///
/// Every method returns the raw response body. Callers parse it with
/// whatever model they prefer.
#[derive(Debug, Clone)]
pub struct BinanceClient<R: RestClient> {
    rest: R,
}

/// Identifies an existing order either by exchange id or client id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    OrderId(u64),
    ClientOrderId(String),
}

impl OrderRef {
    pub(crate) fn apply(&self, params: &mut ParameterSet) {
        match self {
            Self::OrderId(id) => params.insert("orderId", *id),
            Self::ClientOrderId(id) => params.insert("origClientOrderId", id.as_str()),
        };
    }
}

impl<R: RestClient> BinanceClient<R> {
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    pub fn rest(&self) -> &R {
        &self.rest
    }

    pub(crate) async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: ParameterSet,
        security: SecurityType,
    ) -> Result<String, ExchangeError> {
        self.rest
            .send_request(&RestRequest::new(method, endpoint, security).params(params))
            .await
    }
}

/// Reject empty required string parameters before anything is sent.
pub(crate) fn required<'a>(name: &str, value: &'a str) -> Result<&'a str, ExchangeError> {
    if value.trim().is_empty() {
        return Err(ExchangeError::InvalidParameter(format!(
            "'{}' is required",
            name
        )));
    }
    Ok(value)
}

/// `symbol` for one entry, `symbols` as a JSON array for several, nothing for none.
pub(crate) fn symbol_or_symbols(
    params: &mut ParameterSet,
    symbols: &[&str],
) -> Result<(), ExchangeError> {
    for symbol in symbols {
        required("symbols", symbol)?;
    }
    match symbols {
        [] => {}
        [symbol] => {
            params.insert("symbol", *symbol);
        }
        many => {
            params.insert("symbols", ParamValue::json_array(many.iter().copied()));
        }
    }
    Ok(())
}

pub(crate) fn check_limit(limit: Option<u32>, max: u32) -> Result<(), ExchangeError> {
    match limit {
        Some(limit) if limit == 0 || limit > max => Err(ExchangeError::InvalidParameter(format!(
            "limit must be between 1 and {}, got {}",
            max, limit
        ))),
        _ => Ok(()),
    }
}
