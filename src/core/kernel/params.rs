use crate::core::errors::ExchangeError;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// How an array-valued parameter is rendered.
///
/// The exchange is inconsistent across endpoints: some expect JSON array
/// syntax (`["BTCUSDT","BNBUSDT"]`), others a delimiter-joined list
/// (`BTCUSDT,BNBUSDT`). Each call site picks the one its endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayEncoding {
    Json,
    Joined(char),
}

/// A single parameter value before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    UInt(u64),
    /// Serialized with the caller's scale, never in scientific notation
    Decimal(Decimal),
    /// Converted through `Decimal`; non-finite values are rejected
    Float(f64),
    Bool(bool),
    Array(Vec<String>, ArrayEncoding),
}

impl ParamValue {
    pub fn json_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(values.into_iter().map(Into::into).collect(), ArrayEncoding::Json)
    }

    pub fn joined<I, S>(values: I, delimiter: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(
            values.into_iter().map(Into::into).collect(),
            ArrayEncoding::Joined(delimiter),
        )
    }

    /// Render the value as it appears on the wire, before URL encoding.
    pub fn encode(&self) -> Result<String, ExchangeError> {
        match self {
            Self::Str(s) => Ok(s.clone()),
            Self::Int(i) => Ok(i.to_string()),
            Self::UInt(u) => Ok(u.to_string()),
            Self::Decimal(d) => Ok(d.to_string()),
            Self::Float(f) => {
                if !f.is_finite() {
                    return Err(ExchangeError::InvalidParameter(format!(
                        "non-finite numeric value: {}",
                        f
                    )));
                }
                Decimal::from_f64(*f)
                    .map(|d| d.normalize().to_string())
                    .ok_or_else(|| {
                        ExchangeError::InvalidParameter(format!(
                            "numeric value out of decimal range: {}",
                            f
                        ))
                    })
            }
            Self::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Self::Array(values, ArrayEncoding::Json) => Ok(serde_json::to_string(values)?),
            Self::Array(values, ArrayEncoding::Joined(delimiter)) => {
                Ok(values.join(&delimiter.to_string()))
            }
        }
    }

    /// JSON form used inside WebSocket API `params` objects.
    pub fn to_json(&self) -> Result<Value, ExchangeError> {
        match self {
            Self::Str(s) => Ok(Value::String(s.clone())),
            Self::Int(i) => Ok(Value::from(*i)),
            Self::UInt(u) => Ok(Value::from(*u)),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Array(values, ArrayEncoding::Json) => Ok(Value::from(values.clone())),
            // Decimals travel as strings to keep their scale
            Self::Decimal(_) | Self::Float(_) | Self::Array(_, ArrayEncoding::Joined(_)) => {
                Ok(Value::String(self.encode()?))
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<Decimal> for ParamValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! enum_param_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::Str(value.as_str().to_string())
                }
            }
        )+
    };
}

enum_param_value!(
    crate::core::types::OrderSide,
    crate::core::types::OrderType,
    crate::core::types::TimeInForce,
    crate::core::types::NewOrderRespType,
    crate::core::types::KlineInterval,
);

impl TryFrom<Value> for ParamValue {
    type Error = ExchangeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Str(s)),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(Self::UInt(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    // Keep the textual form so the caller's precision survives
                    n.to_string()
                        .parse::<Decimal>()
                        .map(Self::Decimal)
                        .map_err(|e| {
                            ExchangeError::InvalidParameter(format!(
                                "unsupported numeric value {}: {}",
                                n, e
                            ))
                        })
                }
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(ExchangeError::InvalidParameter(format!(
                        "array parameters must contain strings, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|values| Self::Array(values, ArrayEncoding::Json)),
            Value::Null => Err(ExchangeError::InvalidParameter(
                "null is not a parameter value; omit the parameter instead".to_string(),
            )),
            Value::Object(_) => Err(ExchangeError::InvalidParameter(
                "object values are not supported as query parameters".to_string(),
            )),
        }
    }
}

/// Ordered parameter mapping.
///
/// Insertion order is serialization order. Re-inserting an existing name
/// replaces its value in place without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, optional value)` pairs; absent values are skipped.
    pub fn from_optional_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<ParamValue>)>,
        K: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            if let Some(value) = value {
                set.insert(name, value);
            }
        }
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
        self
    }

    /// Insert only when a value is present.
    pub fn insert_opt<V: Into<ParamValue>>(
        &mut self,
        name: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_opt<V: Into<ParamValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.insert_opt(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode every value to its wire string, in order, without URL encoding.
    pub fn encoded_pairs(&self) -> Result<Vec<(String, String)>, ExchangeError> {
        self.entries
            .iter()
            .map(|(name, value)| {
                if name.is_empty() {
                    return Err(ExchangeError::InvalidParameter(
                        "parameter name cannot be empty".to_string(),
                    ));
                }
                Ok((name.clone(), value.encode()?))
            })
            .collect()
    }

    /// Canonical `k1=v1&k2=v2` form with standard form encoding.
    ///
    /// Deterministic: the same set always yields byte-identical output, which
    /// is what makes the signed payload match the transmitted query.
    pub fn to_query_string(&self) -> Result<String, ExchangeError> {
        let pairs = self.encoded_pairs()?;
        serde_urlencoded::to_string(&pairs)
            .map_err(|e| ExchangeError::InvalidParameter(format!("failed to encode query: {}", e)))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderSide;
    use rstest::rstest;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let params = ParameterSet::new()
            .with("symbol", "BTCUSDT")
            .with("side", OrderSide::Buy)
            .with("quantity", dec("0.00100"));
        assert_eq!(
            params.to_query_string().unwrap(),
            "symbol=BTCUSDT&side=BUY&quantity=0.00100"
        );
    }

    #[test]
    fn test_absent_values_are_omitted() {
        let limit: Option<u32> = None;
        let params = ParameterSet::new()
            .with("symbol", "BTCUSDT")
            .with_opt("limit", limit)
            .with_opt("fromId", Some(42_u64));
        assert_eq!(params.to_query_string().unwrap(), "symbol=BTCUSDT&fromId=42");
        assert!(!params.contains("limit"));
    }

    #[test]
    fn test_from_optional_pairs_skips_none() {
        let params = ParameterSet::from_optional_pairs([
            ("a", Some(ParamValue::from(1_i64))),
            ("b", None),
            ("c", Some(ParamValue::from(true))),
        ]);
        assert_eq!(params.to_query_string().unwrap(), "a=1&c=true");
    }

    #[test]
    fn test_canonicalization_is_deterministic() {
        let params = ParameterSet::new()
            .with("symbol", "BNBUSDT")
            .with("price", dec("0.00000001"))
            .with("symbols", ParamValue::json_array(["A", "B"]));
        let first = params.to_query_string().unwrap();
        let second = params.clone().to_query_string().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut params = ParameterSet::new().with("a", 1_i64).with("b", 2_i64);
        params.insert("a", 3_i64);
        assert_eq!(params.to_query_string().unwrap(), "a=3&b=2");
    }

    #[rstest]
    #[case(ParamValue::Decimal(dec("0.00000001")), "0.00000001")]
    #[case(ParamValue::Decimal(dec("25000.50")), "25000.50")]
    #[case(ParamValue::Float(0.1), "0.1")]
    #[case(ParamValue::Bool(false), "false")]
    #[case(ParamValue::Int(-5), "-5")]
    #[case(ParamValue::json_array(["BTCUSDT", "BNBUSDT"]), r#"["BTCUSDT","BNBUSDT"]"#)]
    #[case(ParamValue::joined(["BTCUSDT", "BNBUSDT"], ','), "BTCUSDT,BNBUSDT")]
    fn test_value_encoding(#[case] value: ParamValue, #[case] expected: &str) {
        assert_eq!(value.encode().unwrap(), expected);
    }

    #[test]
    fn test_form_encoding_of_keys_and_values() {
        let params = ParameterSet::new()
            .with("newClientOrderId", "my order/1")
            .with("symbols", ParamValue::json_array(["BTCUSDT"]));
        assert_eq!(
            params.to_query_string().unwrap(),
            "newClientOrderId=my+order%2F1&symbols=%5B%22BTCUSDT%22%5D"
        );
    }

    #[test]
    fn test_non_finite_float_is_invalid() {
        let params = ParameterSet::new().with("price", f64::NAN);
        assert!(matches!(
            params.to_query_string(),
            Err(ExchangeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let params = ParameterSet::new().with("", "x");
        assert!(matches!(
            params.to_query_string(),
            Err(ExchangeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unsupported_json_values() {
        assert!(ParamValue::try_from(serde_json::json!({"a": 1})).is_err());
        assert!(ParamValue::try_from(Value::Null).is_err());
        assert!(ParamValue::try_from(serde_json::json!([1, 2])).is_err());
        assert_eq!(
            ParamValue::try_from(serde_json::json!(10)).unwrap(),
            ParamValue::UInt(10)
        );
        assert_eq!(
            ParamValue::try_from(serde_json::json!(0.25)).unwrap(),
            ParamValue::Decimal(dec("0.25"))
        );
    }

    #[test]
    fn test_json_form_keeps_decimal_scale() {
        assert_eq!(
            ParamValue::Decimal(dec("1.500")).to_json().unwrap(),
            Value::String("1.500".to_string())
        );
        assert_eq!(ParamValue::UInt(7).to_json().unwrap(), Value::from(7_u64));
    }
}
