//! x402 payment signal detection.
//!
//! Pages declare a payment with meta tags, either
//! `<meta name="x-402-amount" content="2.50">` or
//! `<meta property="x402:amount" content="2.50">`. The DOM walk lives in the
//! extension; this module works on the extracted key/value fields so a scan
//! is a pure function of page content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::abi::is_positive_decimal;

pub const PAYMENT_REQUIRED: &str = "payment-required";
pub const AMOUNT: &str = "amount";
pub const CURRENCY: &str = "currency";
pub const DESCRIPTION: &str = "description";
pub const PAYMENT_TARGET: &str = "payment-target";
/// Older pages announce the target as a URL under this key
pub const PAYMENT_URL: &str = "payment-url";

pub const FIELD_KEYS: &[&str] = &[
    PAYMENT_REQUIRED,
    AMOUNT,
    CURRENCY,
    DESCRIPTION,
    PAYMENT_TARGET,
    PAYMENT_URL,
];

pub const DEFAULT_DESCRIPTION: &str = "Content access";

pub fn meta_name(key: &str) -> String {
    format!("x-402-{}", key)
}

pub fn meta_property(key: &str) -> String {
    format!("x402:{}", key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub detected: bool,
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_target: Option<String>,
}

/// Declarative fields read from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields(BTreeMap<String, String>);

impl PageFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank values are treated as absent; the first value for a key wins
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.0.entry(key.into()).or_insert_with(|| value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PageFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = PageFields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

pub struct Scanner {
    default_currency: String,
}

impl Scanner {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    /// `None` means no payment is required. Missing or malformed fields never
    /// raise an error.
    pub fn scan(&self, fields: &PageFields) -> Option<DetectionRecord> {
        let required = fields
            .get(PAYMENT_REQUIRED)
            .map(|flag| flag.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !required {
            return None;
        }

        let Some(amount) = fields.get(AMOUNT) else {
            log::debug!("x402 flag present without an amount");
            return None;
        };
        // token precision is applied at payment time
        if !is_positive_decimal(amount) {
            log::debug!("x402 amount {:?} is not a positive decimal", amount);
            return None;
        }

        Some(DetectionRecord {
            detected: true,
            amount: amount.to_string(),
            currency: fields
                .get(CURRENCY)
                .unwrap_or(&self.default_currency)
                .to_string(),
            description: fields.get(DESCRIPTION).unwrap_or(DEFAULT_DESCRIPTION).to_string(),
            payment_target: fields
                .get(PAYMENT_TARGET)
                .or_else(|| fields.get(PAYMENT_URL))
                .map(str::to_string),
        })
    }
}

/// Rescan only when a mutation inserted a meta tag, directly or nested
pub fn should_rescan<'a>(inserted: impl IntoIterator<Item = (&'a str, bool)>) -> bool {
    inserted
        .into_iter()
        .any(|(node_name, contains_meta)| node_name.eq_ignore_ascii_case("meta") || contains_meta)
}
