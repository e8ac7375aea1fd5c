use super::client::{required, symbol_or_symbols, OrderRef};
use super::trade::NewOrderRequest;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ConnectionState, ParameterSet, WsApiClient, WsApiRequest};
use crate::core::types::SecurityType;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Spot WebSocket API methods over one correlated channel.
///
/// Signed methods sort their parameters by name and carry `apiKey`,
/// `timestamp` and `signature` inside `params`.
#[derive(Debug, Clone)]
pub struct BinanceWsApi {
    channel: WsApiClient,
}

impl BinanceWsApi {
    pub fn new(channel: WsApiClient) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &WsApiClient {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub async fn connect(&self, token: &CancellationToken) -> Result<(), ExchangeError> {
        self.channel.connect(token).await
    }

    pub async fn disconnect(&self, token: &CancellationToken) -> Result<(), ExchangeError> {
        self.channel.disconnect(token).await
    }

    #[instrument(skip(self, token), fields(exchange = "binance"))]
    pub async fn ping(&self, token: &CancellationToken) -> Result<String, ExchangeError> {
        self.channel
            .send_request(WsApiRequest::new("ping", SecurityType::None), token)
            .await
    }

    #[instrument(skip(self, token), fields(exchange = "binance"))]
    pub async fn time(&self, token: &CancellationToken) -> Result<String, ExchangeError> {
        self.channel
            .send_request(WsApiRequest::new("time", SecurityType::None), token)
            .await
    }

    #[instrument(skip(self, token), fields(exchange = "binance"))]
    pub async fn exchange_info(
        &self,
        symbols: &[&str],
        token: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        symbol_or_symbols(&mut params, symbols)?;
        self.channel
            .send_request(
                WsApiRequest::new("exchangeInfo", SecurityType::None).params(params),
                token,
            )
            .await
    }

    #[instrument(skip(self, token), fields(exchange = "binance"))]
    pub async fn account_status(&self, token: &CancellationToken) -> Result<String, ExchangeError> {
        self.channel
            .send_request(WsApiRequest::new("account.status", SecurityType::Signed), token)
            .await
    }

    #[instrument(skip(self, order, token), fields(exchange = "binance", symbol = %order.symbol, side = %order.side))]
    pub async fn order_place(
        &self,
        order: &NewOrderRequest,
        token: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let request = WsApiRequest::new("order.place", SecurityType::Signed)
            .params(order.to_params()?)
            .recv_window(order.recv_window);
        self.channel.send_request(request, token).await
    }

    #[instrument(skip(self, token), fields(exchange = "binance"))]
    pub async fn order_cancel(
        &self,
        symbol: &str,
        order: &OrderRef,
        token: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new().with("symbol", required("symbol", symbol)?);
        order.apply(&mut params);
        self.channel
            .send_request(
                WsApiRequest::new("order.cancel", SecurityType::Signed).params(params),
                token,
            )
            .await
    }
}
