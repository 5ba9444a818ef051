//! Record shapes flowing through the pipeline.
//!
//! A [`RawRecord`] is whatever the input boundary produced for one row. It
//! becomes either a [`CanonicalRecord`] or a [`RejectedRecord`] carrying the
//! untouched raw values and a [`RejectReason`].

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

pub const NAME_FIELD: &str = "name";
pub const AGE_FIELD: &str = "age";
pub const CITY_FIELD: &str = "city";

pub const REQUIRED_FIELDS: [&str; 3] = [NAME_FIELD, AGE_FIELD, CITY_FIELD];

/// One input row keyed by column name. A key mapped to `None` is present but null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: BTreeMap<String, Option<String>>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record where every given field is present and non-null.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Some(v.into())))
            .collect();
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.fields.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the value for `key`, flattening absent keys and null values to `None`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanonicalRecord {
    pub name: String,
    pub age: i64,
    pub city: String,
}

impl CanonicalRecord {
    pub fn new(name: impl Into<String>, age: i64, city: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            city: city.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("missing-required-columns")]
    MissingRequiredColumns,
    #[error("null-required-field")]
    NullRequiredField,
    #[error("normalization-failure")]
    NormalizationFailure,
    #[error("age-not-integer")]
    AgeNotInteger,
    #[error("age-below-threshold (min {threshold})")]
    AgeBelowThreshold { threshold: i64 },
}

impl RejectReason {
    /// Stable short code without any embedded detail.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingRequiredColumns => "missing-required-columns",
            RejectReason::NullRequiredField => "null-required-field",
            RejectReason::NormalizationFailure => "normalization-failure",
            RejectReason::AgeNotInteger => "age-not-integer",
            RejectReason::AgeBelowThreshold { .. } => "age-below-threshold",
        }
    }
}

/// A row that failed validation. Field values are the raw inputs, never normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub name: Option<String>,
    pub age: Option<String>,
    pub city: Option<String>,
    pub reason: RejectReason,
}

impl RejectedRecord {
    pub fn from_raw(raw: &RawRecord, reason: RejectReason) -> Self {
        Self {
            name: raw.get(NAME_FIELD).map(str::to_string),
            age: raw.get(AGE_FIELD).map(str::to_string),
            city: raw.get(CITY_FIELD).map(str::to_string),
            reason,
        }
    }

    /// Sink columns in `name, age, city, reason` order; missing values become empty cells.
    pub fn to_row(&self) -> [String; 4] {
        [
            self.name.clone().unwrap_or_default(),
            self.age.clone().unwrap_or_default(),
            self.city.clone().unwrap_or_default(),
            self.reason.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_flattens_null_and_absent() {
        let mut raw = RawRecord::new();
        raw.insert(NAME_FIELD, None);
        assert!(raw.contains_key(NAME_FIELD));
        assert_eq!(raw.get(NAME_FIELD), None);
        assert_eq!(raw.get(CITY_FIELD), None);
    }

    #[test]
    fn rejected_row_keeps_raw_text_and_reason() {
        let raw = RawRecord::from_pairs([(NAME_FIELD, " naomi "), (AGE_FIELD, "23")]);
        let rejected =
            RejectedRecord::from_raw(&raw, RejectReason::AgeBelowThreshold { threshold: 25 });
        assert_eq!(
            rejected.to_row(),
            [
                " naomi ".to_string(),
                "23".to_string(),
                String::new(),
                "age-below-threshold (min 25)".to_string()
            ]
        );
        assert_eq!(rejected.reason.code(), "age-below-threshold");
    }
}
