use super::client::{required, BinanceClient};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParamValue, ParameterSet, RestClient};
use crate::core::types::SecurityType;
use reqwest::Method;
use tracing::instrument;

const MAX_ISOLATED_SYMBOLS: usize = 5;

impl<R: RestClient> BinanceClient<R> {
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn margin_account(&self) -> Result<String, ExchangeError> {
        self.call(
            Method::GET,
            "/sapi/v1/margin/account",
            ParameterSet::new(),
            SecurityType::Signed,
        )
        .await
    }

    /// Isolated margin details; this endpoint takes `symbols` comma-joined,
    /// not as a JSON array.
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn isolated_margin_account(&self, symbols: &[&str]) -> Result<String, ExchangeError> {
        if symbols.len() > MAX_ISOLATED_SYMBOLS {
            return Err(ExchangeError::InvalidParameter(format!(
                "at most {} symbols may be queried at once",
                MAX_ISOLATED_SYMBOLS
            )));
        }
        for symbol in symbols {
            required("symbols", symbol)?;
        }

        let mut params = ParameterSet::new();
        if !symbols.is_empty() {
            params.insert("symbols", ParamValue::joined(symbols.iter().copied(), ','));
        }
        self.call(
            Method::GET,
            "/sapi/v1/margin/isolated/account",
            params,
            SecurityType::Signed,
        )
        .await
    }
}
