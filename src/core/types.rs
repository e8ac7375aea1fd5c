use serde::{Deserialize, Serialize};
use std::fmt;

/// How an endpoint authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityType {
    /// Public endpoint, no key and no signature
    None,
    /// API key header only (listen key management)
    ApiKey,
    /// API key header, `timestamp` and `signature`
    Signed,
}

impl SecurityType {
    pub const fn requires_api_key(self) -> bool {
        matches!(self, Self::ApiKey | Self::Signed)
    }

    pub const fn requires_signature(self) -> bool {
        matches!(self, Self::Signed)
    }
}

/// Wire-level enum values are passed through the canonicalizer as strings.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    OrderSide {
        Buy => "BUY",
        Sell => "SELL",
    }
);

wire_enum!(
    OrderType {
        Market => "MARKET",
        Limit => "LIMIT",
        StopLoss => "STOP_LOSS",
        StopLossLimit => "STOP_LOSS_LIMIT",
        TakeProfit => "TAKE_PROFIT",
        TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        LimitMaker => "LIMIT_MAKER",
    }
);

wire_enum!(
    TimeInForce {
        Gtc => "GTC",
        Ioc => "IOC",
        Fok => "FOK",
    }
);

wire_enum!(
    /// Response detail level for order placement
    NewOrderRespType {
        Ack => "ACK",
        Result => "RESULT",
        Full => "FULL",
    }
);

wire_enum!(
    KlineInterval {
        Seconds1 => "1s",
        Minutes1 => "1m",
        Minutes3 => "3m",
        Minutes5 => "5m",
        Minutes15 => "15m",
        Minutes30 => "30m",
        Hours1 => "1h",
        Hours2 => "2h",
        Hours4 => "4h",
        Hours6 => "6h",
        Hours8 => "8h",
        Hours12 => "12h",
        Days1 => "1d",
        Days3 => "3d",
        Weeks1 => "1w",
        Months1 => "1M",
    }
);
