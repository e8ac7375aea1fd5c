use crate::core::errors::ExchangeError;
use crate::core::stream::{combined_stream_url, single_stream_url, StreamReader};
use crate::core::types::KlineInterval;

/// Public market data streams
pub struct MarketDataStream;

impl MarketDataStream {
    /// Raw stream at `/ws/{stream}`; frames are the event payload itself
    pub fn single<F>(base_url: &str, stream: &str, handler: F) -> Result<StreamReader, ExchangeError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Ok(StreamReader::new(single_stream_url(base_url, stream)?, handler))
    }

    /// Combined stream; frames are wrapped as `{"stream": ..., "data": ...}`
    pub fn combined<F, S>(
        base_url: &str,
        streams: &[S],
        handler: F,
    ) -> Result<StreamReader, ExchangeError>
    where
        F: Fn(String) + Send + Sync + 'static,
        S: AsRef<str>,
    {
        Ok(StreamReader::new(combined_stream_url(base_url, streams)?, handler))
    }
}

/// Private account event stream identified by a listen key
pub struct UserDataStream;

impl UserDataStream {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<F>(base_url: &str, listen_key: &str, handler: F) -> Result<StreamReader, ExchangeError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Ok(StreamReader::new(single_stream_url(base_url, listen_key)?, handler))
    }
}

pub fn trade_stream(symbol: &str) -> String {
    format!("{}@trade", symbol.to_lowercase())
}

pub fn agg_trade_stream(symbol: &str) -> String {
    format!("{}@aggTrade", symbol.to_lowercase())
}

pub fn kline_stream(symbol: &str, interval: KlineInterval) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval)
}

pub fn book_ticker_stream(symbol: &str) -> String {
    format!("{}@bookTicker", symbol.to_lowercase())
}

/// Partial book depth; `levels` is 5, 10 or 20
pub fn depth_stream(symbol: &str, levels: u8) -> Result<String, ExchangeError> {
    if !matches!(levels, 5 | 10 | 20) {
        return Err(ExchangeError::InvalidParameter(format!(
            "depth levels must be 5, 10 or 20, got {}",
            levels
        )));
    }
    Ok(format!("{}@depth{}", symbol.to_lowercase(), levels))
}
