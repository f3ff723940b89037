//! Market-data subscription keys and the per-strategy registration set.

use crate::domain::error::FutdataError;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Canonical identifier for a market-data subscription.
///
/// `Instrument` subscribes either to a concrete instrument or, when `product`
/// is set, to the product's dominant (or sub-dominant) contract of the day;
/// `product` wins when both are given. `Index` subscribes to a product index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegisterKey {
    Instrument {
        product: Option<String>,
        instrument: Option<String>,
        sub_dominant: bool,
    },
    Index {
        product: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawRegisterKey {
    Instrument {
        product: Option<String>,
        instrument: Option<String>,
        sub_dominant: bool,
    },
    Index {
        product: String,
    },
}

impl RegisterKey {
    /// Key following a product's dominant contract.
    pub fn dominant(product: impl Into<String>) -> Self {
        RegisterKey::Instrument {
            product: Some(product.into()),
            instrument: None,
            sub_dominant: false,
        }
    }

    /// Key following a product's sub-dominant contract.
    pub fn sub_dominant(product: impl Into<String>) -> Self {
        RegisterKey::Instrument {
            product: Some(product.into()),
            instrument: None,
            sub_dominant: true,
        }
    }

    /// Key pinned to one concrete instrument.
    pub fn for_instrument(instrument: impl Into<String>) -> Self {
        RegisterKey::Instrument {
            product: None,
            instrument: Some(instrument.into()),
            sub_dominant: false,
        }
    }

    pub fn index(product: impl Into<String>) -> Self {
        RegisterKey::Index {
            product: product.into(),
        }
    }

    /// General constructor; at least one of `product` / `instrument` is required.
    pub fn new(
        product: Option<String>,
        instrument: Option<String>,
        sub_dominant: bool,
    ) -> Result<Self, FutdataError> {
        let key = RegisterKey::Instrument {
            product,
            instrument,
            sub_dominant,
        };
        key.validate()?;
        Ok(key)
    }

    pub fn validate(&self) -> Result<(), FutdataError> {
        match self {
            RegisterKey::Instrument {
                product: None,
                instrument: None,
                ..
            } => Err(FutdataError::invalid(
                "register key needs a product or an instrument",
            )),
            RegisterKey::Index { product } if product.is_empty() => {
                Err(FutdataError::invalid("index register key needs a product"))
            }
            _ => Ok(()),
        }
    }

    /// Deterministic string form, usable as a map or set key.
    ///
    /// Object keys are emitted in sorted order, so equal keys always produce
    /// identical text.
    pub fn serialize(&self) -> String {
        let value = match self {
            RegisterKey::Instrument {
                product,
                instrument,
                sub_dominant,
            } => json!({
                "kind": "instrument",
                "product": product,
                "instrument": instrument,
                "sub_dominant": sub_dominant,
            }),
            RegisterKey::Index { product } => json!({
                "kind": "index",
                "product": product,
            }),
        };
        value.to_string()
    }

    pub fn deserialize(s: &str) -> Result<Self, FutdataError> {
        let raw: RawRegisterKey = serde_json::from_str(s)?;
        let key = match raw {
            RawRegisterKey::Instrument {
                product,
                instrument,
                sub_dominant,
            } => RegisterKey::Instrument {
                product,
                instrument,
                sub_dominant,
            },
            RawRegisterKey::Index { product } => RegisterKey::Index { product },
        };
        key.validate()?;
        Ok(key)
    }
}

impl fmt::Display for RegisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for RegisterKey {
    type Err = FutdataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegisterKey::deserialize(s)
    }
}

/// Subscriptions held by one strategy. Registering a key twice is an error.
#[derive(Debug, Default, Clone)]
pub struct RegisterSet {
    keys: HashSet<RegisterKey>,
    order: Vec<RegisterKey>,
}

impl RegisterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` and returns its serialized form.
    pub fn register(&mut self, key: RegisterKey) -> Result<String, FutdataError> {
        key.validate()?;
        let serialized = key.serialize();
        if self.keys.contains(&key) {
            return Err(FutdataError::DuplicateRegistration { key: serialized });
        }
        self.keys.insert(key.clone());
        self.order.push(key);
        Ok(serialized)
    }

    pub fn contains(&self, key: &RegisterKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterKey> {
        self.order.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn serialize_is_stable() {
        let key = RegisterKey::dominant("rb");
        assert_eq!(
            key.serialize(),
            r#"{"instrument":null,"kind":"instrument","product":"rb","sub_dominant":false}"#
        );
        assert_eq!(key.serialize(), RegisterKey::dominant("rb").serialize());
    }

    #[test]
    fn index_and_instrument_keys_differ() {
        let a = RegisterKey::dominant("rb").serialize();
        let b = RegisterKey::index("rb").serialize();
        assert_ne!(a, b);
    }

    #[test]
    fn sub_dominant_flag_is_part_of_identity() {
        assert_ne!(RegisterKey::dominant("rb"), RegisterKey::sub_dominant("rb"));
        assert_ne!(
            RegisterKey::dominant("rb").serialize(),
            RegisterKey::sub_dominant("rb").serialize()
        );
    }

    #[test]
    fn new_requires_product_or_instrument() {
        match RegisterKey::new(None, None, false) {
            Err(FutdataError::InvalidArgument { .. }) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
        assert!(RegisterKey::new(None, Some("rb1705".into()), false).is_ok());
    }

    #[test]
    fn deserialize_rejects_empty_key() {
        let text = r#"{"instrument":null,"kind":"instrument","product":null,"sub_dominant":false}"#;
        assert!(matches!(
            RegisterKey::deserialize(text),
            Err(FutdataError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(matches!(
            RegisterKey::deserialize("not json"),
            Err(FutdataError::Serialization(_))
        ));
        assert!(RegisterKey::deserialize(r#"{"kind":"spread","product":"rb"}"#).is_err());
    }

    #[test]
    fn register_set_rejects_duplicates() {
        let mut set = RegisterSet::new();
        let first = set.register(RegisterKey::dominant("rb")).unwrap();
        assert_eq!(first, RegisterKey::dominant("rb").serialize());
        match set.register(RegisterKey::dominant("rb")) {
            Err(FutdataError::DuplicateRegistration { key }) => assert_eq!(key, first),
            other => panic!("expected DuplicateRegistration, got {other:?}"),
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn register_set_keeps_order() {
        let mut set = RegisterSet::new();
        set.register(RegisterKey::index("cu")).unwrap();
        set.register(RegisterKey::for_instrument("rb1705")).unwrap();
        let keys: Vec<_> = set.iter().cloned().collect();
        assert_eq!(
            keys,
            vec![RegisterKey::index("cu"), RegisterKey::for_instrument("rb1705")]
        );
        assert!(set.contains(&RegisterKey::index("cu")));
        assert!(!set.contains(&RegisterKey::index("rb")));
    }

    #[test]
    fn register_set_rejects_invalid_variant() {
        let mut set = RegisterSet::new();
        let bad = RegisterKey::Instrument {
            product: None,
            instrument: None,
            sub_dominant: true,
        };
        assert!(set.register(bad).is_err());
        assert!(set.is_empty());
    }

    fn name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_\" ]{1,12}"
    }

    proptest! {
        #[test]
        fn instrument_key_round_trips(
            product in proptest::option::of(name()),
            instrument in proptest::option::of(name()),
            sub_dominant in any::<bool>(),
        ) {
            prop_assume!(product.is_some() || instrument.is_some());
            let key = RegisterKey::new(product, instrument, sub_dominant).unwrap();
            let back = RegisterKey::deserialize(&key.serialize()).unwrap();
            prop_assert_eq!(back, key);
        }

        #[test]
        fn index_key_round_trips(product in name()) {
            let key = RegisterKey::index(product);
            let back: RegisterKey = key.to_string().parse().unwrap();
            prop_assert_eq!(back, key);
        }
    }
}
