use super::client::{check_limit, required, symbol_or_symbols, BinanceClient};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParameterSet, RestClient};
use crate::core::types::{KlineInterval, SecurityType};
use reqwest::Method;
use tracing::instrument;

/// Optional time window and page size shared by history endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub limit: Option<u32>,
}

impl TimeRange {
    pub(crate) fn apply(&self, params: &mut ParameterSet, max_limit: u32) -> Result<(), ExchangeError> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(ExchangeError::InvalidParameter(format!(
                    "startTime {} is after endTime {}",
                    start, end
                )));
            }
        }
        check_limit(self.limit, max_limit)?;
        params
            .insert_opt("startTime", self.start_time)
            .insert_opt("endTime", self.end_time)
            .insert_opt("limit", self.limit);
        Ok(())
    }
}

impl<R: RestClient> BinanceClient<R> {
    /// Test connectivity
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn ping(&self) -> Result<String, ExchangeError> {
        self.call(Method::GET, "/api/v3/ping", ParameterSet::new(), SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn server_time(&self) -> Result<String, ExchangeError> {
        self.call(Method::GET, "/api/v3/time", ParameterSet::new(), SecurityType::None)
            .await
    }

    /// Trading rules and symbol information; all symbols when `symbols` is empty
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn exchange_info(&self, symbols: &[&str]) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        symbol_or_symbols(&mut params, symbols)?;
        self.call(Method::GET, "/api/v3/exchangeInfo", params, SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn order_book(&self, symbol: &str, limit: Option<u32>) -> Result<String, ExchangeError> {
        check_limit(limit, 5000)?;
        let params = ParameterSet::new()
            .with("symbol", required("symbol", symbol)?)
            .with_opt("limit", limit);
        self.call(Method::GET, "/api/v3/depth", params, SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn recent_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<String, ExchangeError> {
        check_limit(limit, 1000)?;
        let params = ParameterSet::new()
            .with("symbol", required("symbol", symbol)?)
            .with_opt("limit", limit);
        self.call(Method::GET, "/api/v3/trades", params, SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        range: TimeRange,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new()
            .with("symbol", required("symbol", symbol)?)
            .with("interval", interval);
        range.apply(&mut params, 1000)?;
        self.call(Method::GET, "/api/v3/klines", params, SecurityType::None)
            .await
    }

    /// 24 hour rolling statistics; every symbol when `symbol` is `None`
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn ticker_24hr(&self, symbol: Option<&str>) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        if let Some(symbol) = symbol {
            params.insert("symbol", required("symbol", symbol)?);
        }
        self.call(Method::GET, "/api/v3/ticker/24hr", params, SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn ticker_price(&self, symbols: &[&str]) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        symbol_or_symbols(&mut params, symbols)?;
        self.call(Method::GET, "/api/v3/ticker/price", params, SecurityType::None)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn avg_price(&self, symbol: &str) -> Result<String, ExchangeError> {
        let params = ParameterSet::new().with("symbol", required("symbol", symbol)?);
        self.call(Method::GET, "/api/v3/avgPrice", params, SecurityType::None)
            .await
    }
}
