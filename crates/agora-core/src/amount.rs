//! Minor-unit amounts on the wire.
//!
//! Amounts are `u128` in memory and decimal strings in JSON, so wei-scale
//! values survive JavaScript clients. Plain JSON integers are accepted on input.

use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Text(String),
    Number(u64),
}

pub fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&amount.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    match Wire::deserialize(deserializer)? {
        Wire::Text(text) => text
            .trim()
            .parse::<u128>()
            .map_err(|e| de::Error::custom(format!("invalid amount '{}': {}", text, e))),
        Wire::Number(n) => Ok(n as u128),
    }
}

/// Same encoding for optional amounts.
pub mod option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match amount {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "super")] u128);

        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(v)| v))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Priced {
        #[serde(with = "crate::amount")]
        amount: u128,
        #[serde(default, with = "crate::amount::option")]
        limit: Option<u128>,
    }

    #[test]
    fn test_accepts_string_and_number() {
        let a: Priced = serde_json::from_str(r#"{"amount":"340282366920938463463374607431768211455"}"#).unwrap();
        assert_eq!(a.amount, u128::MAX);
        assert_eq!(a.limit, None);

        let b: Priced = serde_json::from_str(r#"{"amount":42,"limit":"7"}"#).unwrap();
        assert_eq!(b.amount, 42);
        assert_eq!(b.limit, Some(7));
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&Priced { amount: 100, limit: None }).unwrap();
        assert_eq!(json, r#"{"amount":"100","limit":null}"#);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<Priced>(r#"{"amount":"ten"}"#).is_err());
    }
}
