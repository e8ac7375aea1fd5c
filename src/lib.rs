pub mod core;
pub mod exchanges;

pub use crate::core::{
    config::{ExchangeConfig, KeyType},
    errors::ExchangeError,
    types::*,
};
pub use crate::exchanges::binance::{BinanceClient, BinanceWsApi};
