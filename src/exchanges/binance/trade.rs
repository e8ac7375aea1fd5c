use super::client::{required, BinanceClient, OrderRef};
use super::market::TimeRange;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ParameterSet, RestClient, RestRequest};
use crate::core::types::{NewOrderRespType, OrderSide, OrderType, SecurityType, TimeInForce};
use reqwest::Method;
use rust_decimal::Decimal;
use tracing::instrument;

/// Parameters of a new order, shared by the REST and WebSocket APIs.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: Option<TimeInForce>,
    pub quantity: Option<Decimal>,
    pub quote_order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub iceberg_qty: Option<Decimal>,
    pub new_client_order_id: Option<String>,
    pub new_order_resp_type: Option<NewOrderRespType>,
    pub recv_window: Option<u64>,
}

impl NewOrderRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            time_in_force: None,
            quantity: None,
            quote_order_qty: None,
            price: None,
            stop_price: None,
            iceberg_qty: None,
            new_client_order_id: None,
            new_order_resp_type: None,
            recv_window: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            time_in_force: Some(time_in_force),
            quantity: Some(quantity),
            price: Some(price),
            ..Self::new(symbol, side, OrderType::Limit)
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::new(symbol, side, OrderType::Market)
        }
    }

    #[must_use]
    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.new_client_order_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn resp_type(mut self, resp_type: NewOrderRespType) -> Self {
        self.new_order_resp_type = Some(resp_type);
        self
    }

    #[must_use]
    pub fn stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    #[must_use]
    pub fn recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = Some(recv_window);
        self
    }

    fn validate(&self) -> Result<(), ExchangeError> {
        required("symbol", &self.symbol)?;

        let missing = |name: &str| -> Result<(), ExchangeError> {
            Err(ExchangeError::InvalidParameter(format!(
                "{} orders require '{}'",
                self.order_type, name
            )))
        };
        let needs_limit_fields = matches!(
            self.order_type,
            OrderType::Limit | OrderType::StopLossLimit | OrderType::TakeProfitLimit
        );
        if needs_limit_fields && self.time_in_force.is_none() {
            return missing("timeInForce");
        }
        if (needs_limit_fields || self.order_type == OrderType::LimitMaker) && self.price.is_none() {
            return missing("price");
        }
        if self.order_type == OrderType::Market {
            if self.quantity.is_none() && self.quote_order_qty.is_none() {
                return missing("quantity");
            }
        } else if self.quantity.is_none() {
            return missing("quantity");
        }
        if self.order_type != OrderType::Market
            && self.order_type != OrderType::Limit
            && self.order_type != OrderType::LimitMaker
            && self.stop_price.is_none()
        {
            return missing("stopPrice");
        }

        for (name, value) in [
            ("quantity", self.quantity),
            ("quoteOrderQty", self.quote_order_qty),
            ("price", self.price),
            ("stopPrice", self.stop_price),
            ("icebergQty", self.iceberg_qty),
        ] {
            if matches!(value, Some(v) if v <= Decimal::ZERO) {
                return Err(ExchangeError::InvalidParameter(format!(
                    "'{}' must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Validate and render in the exchange's documented field order.
    pub fn to_params(&self) -> Result<ParameterSet, ExchangeError> {
        self.validate()?;
        Ok(ParameterSet::new()
            .with("symbol", self.symbol.as_str())
            .with("side", self.side)
            .with("type", self.order_type)
            .with_opt("timeInForce", self.time_in_force)
            .with_opt("quantity", self.quantity)
            .with_opt("quoteOrderQty", self.quote_order_qty)
            .with_opt("price", self.price)
            .with_opt("newClientOrderId", self.new_client_order_id.as_deref())
            .with_opt("stopPrice", self.stop_price)
            .with_opt("icebergQty", self.iceberg_qty)
            .with_opt("newOrderRespType", self.new_order_resp_type))
    }
}

impl<R: RestClient> BinanceClient<R> {
    async fn submit_order(
        &self,
        endpoint: &str,
        order: &NewOrderRequest,
    ) -> Result<String, ExchangeError> {
        let request = RestRequest::new(Method::POST, endpoint, SecurityType::Signed)
            .params(order.to_params()?)
            .recv_window(order.recv_window);
        self.rest().send_request(&request).await
    }

    #[instrument(skip(self, order), fields(exchange = "binance", symbol = %order.symbol, side = %order.side))]
    pub async fn new_order(&self, order: &NewOrderRequest) -> Result<String, ExchangeError> {
        self.submit_order("/api/v3/order", order).await
    }

    /// Validates an order against the exchange without placing it
    #[instrument(skip(self, order), fields(exchange = "binance", symbol = %order.symbol))]
    pub async fn test_new_order(&self, order: &NewOrderRequest) -> Result<String, ExchangeError> {
        self.submit_order("/api/v3/order/test", order).await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new().with("symbol", required("symbol", symbol)?);
        order.apply(&mut params);
        self.call(Method::DELETE, "/api/v3/order", params, SecurityType::Signed)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn cancel_open_orders(&self, symbol: &str) -> Result<String, ExchangeError> {
        let params = ParameterSet::new().with("symbol", required("symbol", symbol)?);
        self.call(Method::DELETE, "/api/v3/openOrders", params, SecurityType::Signed)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn query_order(
        &self,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new().with("symbol", required("symbol", symbol)?);
        order.apply(&mut params);
        self.call(Method::GET, "/api/v3/order", params, SecurityType::Signed)
            .await
    }

    /// Open orders for one symbol, or for all symbols when `None`
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new();
        if let Some(symbol) = symbol {
            params.insert("symbol", required("symbol", symbol)?);
        }
        self.call(Method::GET, "/api/v3/openOrders", params, SecurityType::Signed)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn all_orders(
        &self,
        symbol: &str,
        order_id: Option<u64>,
        range: TimeRange,
    ) -> Result<String, ExchangeError> {
        let mut params = ParameterSet::new()
            .with("symbol", required("symbol", symbol)?)
            .with_opt("orderId", order_id);
        range.apply(&mut params, 1000)?;
        self.call(Method::GET, "/api/v3/allOrders", params, SecurityType::Signed)
            .await
    }
}
