use super::client::{required, BinanceClient};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParameterSet, RestClient};
use crate::core::types::SecurityType;
use reqwest::Method;
use tracing::instrument;

const USER_DATA_STREAM: &str = "/api/v3/userDataStream";

/// Listen key management. These calls carry the API key but no signature.
impl<R: RestClient> BinanceClient<R> {
    /// Start a user data stream; the response carries the `listenKey`
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn create_listen_key(&self) -> Result<String, ExchangeError> {
        self.call(
            Method::POST,
            USER_DATA_STREAM,
            ParameterSet::new(),
            SecurityType::ApiKey,
        )
        .await
    }

    /// Extend the key's validity; callers schedule this themselves
    #[instrument(skip(self, listen_key), fields(exchange = "binance"))]
    pub async fn renew_listen_key(&self, listen_key: &str) -> Result<String, ExchangeError> {
        let params = ParameterSet::new().with("listenKey", required("listenKey", listen_key)?);
        self.call(Method::PUT, USER_DATA_STREAM, params, SecurityType::ApiKey)
            .await
    }

    #[instrument(skip(self, listen_key), fields(exchange = "binance"))]
    pub async fn close_listen_key(&self, listen_key: &str) -> Result<String, ExchangeError> {
        let params = ParameterSet::new().with("listenKey", required("listenKey", listen_key)?);
        self.call(Method::DELETE, USER_DATA_STREAM, params, SecurityType::ApiKey)
            .await
    }
}
