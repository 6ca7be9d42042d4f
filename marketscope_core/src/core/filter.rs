use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::{
    SENTINEL_ALL,
    core::{
        field_type::{format_number, parse_number},
        schema::{FilterBinding, MatchKind},
    },
};

/// Closed numeric interval; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    /// Returns `None` when both bounds are present and reversed.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) if min > max => None,
            _ => Some(Self { min, max }),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    /// Canonical token: `a-b`, `a+`, or `-b` for an upper bound only.
    pub fn to_token(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("{}-{}", format_number(min), format_number(max)),
            (Some(min), None) => format!("{}+", format_number(min)),
            (None, Some(max)) => format!("-{}", format_number(max)),
            (None, None) => String::new(),
        }
    }
}

/// Parses `"10-50"`, `"100+"` or a single number. Anything else is `None`.
pub fn parse_range_token(token: &str) -> Option<NumericRange> {
    let token = token.trim();

    if let Some(min) = token.strip_suffix('+') {
        return NumericRange::new(Some(parse_number(min)?), None);
    }

    let mut parts = token.split('-');
    let first = parts.next()?;

    match (parts.next(), parts.next()) {
        (None, _) => {
            let value = parse_number(first)?;
            NumericRange::new(Some(value), Some(value))
        }
        (Some(second), None) => {
            NumericRange::new(Some(parse_number(first)?), Some(parse_number(second)?))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Range(NumericRange),
}

impl FilterValue {
    pub fn to_token(&self) -> String {
        match self {
            FilterValue::Text(text) => text.clone(),
            FilterValue::Number(number) => format_number(*number),
            FilterValue::Range(range) => range.to_token(),
        }
    }
}

/// Normalized constraints keyed by filter name. Keys are kept sorted so that
/// parameter order never changes equality or the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec(BTreeMap<String, FilterValue>);

impl FilterSpec {
    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: FilterValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Request parameters that normalize back to this exact spec.
    pub fn to_params(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_token()))
            .collect()
    }

    /// Stable textual form, used as part of cache keys.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}={}", key, value.to_token()))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Turns raw request parameters into a [`FilterSpec`] for one table's bindings.
///
/// Never fails: unrecognized keys are skipped, and unusable values are logged
/// and dropped (or, for numeric filters, kept as text for the translator to skip).
pub struct FilterNormalizer<'a> {
    bindings: &'a [FilterBinding],
}

impl<'a> FilterNormalizer<'a> {
    pub fn new(bindings: &'a [FilterBinding]) -> Self {
        Self { bindings }
    }

    pub fn normalize<I, K, V>(&self, params: I) -> FilterSpec
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut spec = FilterSpec::default();

        for (key, raw) in params {
            let key = key.as_ref().trim();

            let Some(binding) = self.bindings.iter().find(|b| b.key == key) else {
                continue;
            };

            match normalize_value(binding, raw.as_ref()) {
                Some(value) => spec.insert(key, value),
                None => {
                    // A later "all" clears an earlier value for the same key.
                    spec.0.remove(key);
                }
            }
        }

        spec
    }

    /// Re-applies normalization to an already normalized spec.
    pub fn renormalize(&self, spec: &FilterSpec) -> FilterSpec {
        self.normalize(spec.to_params())
    }
}

fn normalize_value(binding: &FilterBinding, raw: &str) -> Option<FilterValue> {
    let value = raw.trim();

    if value.is_empty() || value == SENTINEL_ALL {
        return None;
    }

    match binding.kind {
        MatchKind::Equals | MatchKind::Contains | MatchKind::Membership => {
            Some(FilterValue::Text(value.to_string()))
        }
        MatchKind::Minimum | MatchKind::Maximum => match parse_number(value) {
            Some(number) => Some(FilterValue::Number(number)),
            None => {
                warn!(
                    "Filter {} expects a number, got {:?}; passing it through as text",
                    binding.key, value
                );
                Some(FilterValue::Text(value.to_string()))
            }
        },
        MatchKind::Range => match parse_range_token(value) {
            Some(range) => Some(FilterValue::Range(range)),
            None => {
                warn!("Ignoring malformed range {:?} for filter {}", value, binding.key);
                None
            }
        },
    }
}
