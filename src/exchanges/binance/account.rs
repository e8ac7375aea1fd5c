use super::client::{required, BinanceClient};
use super::market::TimeRange;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParameterSet, RestClient};
use crate::core::types::SecurityType;
use reqwest::Method;
use tracing::instrument;

impl<R: RestClient> BinanceClient<R> {
    /// Balances and permissions of the account
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn account(&self, omit_zero_balances: bool) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        if omit_zero_balances {
            params.insert("omitZeroBalances", true);
        }
        self.call(Method::GET, "/api/v3/account", params, SecurityType::Signed)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn my_trades(
        &self,
        symbol: &str,
        from_id: Option<u64>,
        range: TimeRange,
    ) -> Result<String, ExchangeError> {
        if from_id.is_some() && (range.start_time.is_some() || range.end_time.is_some()) {
            return Err(ExchangeError::InvalidParameter(
                "fromId cannot be combined with startTime or endTime".to_string(),
            ));
        }
        let mut params = ParameterSet::new()
            .with("symbol", required("symbol", symbol)?)
            .with_opt("fromId", from_id);
        range.apply(&mut params, 1000)?;
        self.call(Method::GET, "/api/v3/myTrades", params, SecurityType::Signed)
            .await
    }

    /// Current order-count usage across all rate-limit intervals
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn rate_limit_order_count(&self) -> Result<String, ExchangeError> {
        self.call(
            Method::GET,
            "/api/v3/rateLimit/order",
            ParameterSet::new(),
            SecurityType::Signed,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::binance::client::mock;

    #[tokio::test]
    async fn test_account_is_signed() {
        let client = mock::client();
        client.account(true).await.unwrap();
        let request = client.rest().last();
        assert_eq!(request.endpoint, "/api/v3/account");
        assert_eq!(request.security, SecurityType::Signed);
        assert_eq!(
            request.params.to_query_string().unwrap(),
            "omitZeroBalances=true"
        );
    }

    #[tokio::test]
    async fn test_my_trades_rejects_from_id_with_time_range() {
        let client = mock::client();
        let range = TimeRange {
            start_time: Some(1),
            ..TimeRange::default()
        };
        assert!(matches!(
            client.my_trades("BTCUSDT", Some(10), range).await,
            Err(ExchangeError::InvalidParameter(_))
        ));
        assert_eq!(client.rest().count(), 0);

        client
            .my_trades("BTCUSDT", Some(10), TimeRange::default())
            .await
            .unwrap();
        assert_eq!(
            client.rest().last().params.to_query_string().unwrap(),
            "symbol=BTCUSDT&fromId=10"
        );
    }
}
