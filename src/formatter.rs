//! Cell lookup and display formatting for report rows.
//!
//! Column names come from the aggregation function and may not match the
//! keys a page asks for. Lookup tries an ordered list of key strategies and
//! the first hit wins. A miss is `DisplayValue::Empty`, distinct from a
//! present NULL.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};

use crate::report::{ReportResult, ReportRow, ReportValue};

/// Decimal places for non-integral decimals.
const DECIMAL_PLACES: u32 = 2;

// ═══════════════════════════════════════════════════════════
// Key strategies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    Exact,
    UnderscoresToSpaces,
    SpacesToUnderscores,
    /// Case, surrounding whitespace and `_`/space separators ignored.
    Normalized,
}

/// Resolution order. First match wins.
pub const KEY_STRATEGIES: [KeyStrategy; 4] = [
    KeyStrategy::Exact,
    KeyStrategy::UnderscoresToSpaces,
    KeyStrategy::SpacesToUnderscores,
    KeyStrategy::Normalized,
];

impl KeyStrategy {
    fn find<'r>(self, row: &'r ReportRow, requested: &str) -> Option<&'r ReportValue> {
        match self {
            Self::Exact => row.get(requested),
            Self::UnderscoresToSpaces => row.get(&requested.replace('_', " ")),
            Self::SpacesToUnderscores => row.get(&requested.replace(' ', "_")),
            Self::Normalized => {
                let wanted = normalize_key(requested);
                row.iter()
                    .find(|(key, _)| normalize_key(key) == wanted)
                    .map(|(_, value)| value)
            }
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Raw value under `requested`, or `None` when no strategy matches.
pub fn resolve<'r>(row: &'r ReportRow, requested: &str) -> Option<&'r ReportValue> {
    KEY_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.find(row, requested))
}

// ═══════════════════════════════════════════════════════════
// Display values
// ═══════════════════════════════════════════════════════════

/// A cell ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    /// No column matched the requested key.
    Empty,
    Null,
    Text(String),
    Integer(i64),
    /// Pre-formatted decimal.
    Number(String),
}

impl DisplayValue {
    pub fn is_empty_marker(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl Serialize for DisplayValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Null => serializer.serialize_none(),
            Self::Text(s) | Self::Number(s) => serializer.serialize_str(s),
            Self::Integer(i) => serializer.serialize_i64(*i),
        }
    }
}

impl From<&ReportValue> for DisplayValue {
    fn from(value: &ReportValue) -> Self {
        match value {
            ReportValue::Null => Self::Null,
            ReportValue::Integer(i) => Self::Integer(*i),
            ReportValue::Decimal(d) => Self::Number(format_decimal(*d)),
            ReportValue::Text(s) => Self::Text(s.clone()),
        }
    }
}

/// `5.00` → `"5"`, `5.25` → `"5.25"`, `5.255` → `"5.26"`.
pub fn format_decimal(value: Decimal) -> String {
    if value.fract().is_zero() {
        return value.trunc().normalize().to_string();
    }
    let mut rounded =
        value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMAL_PLACES);
    rounded.to_string()
}

/// Formatted value of `requested` in `row`.
pub fn lookup(row: &ReportRow, requested: &str) -> DisplayValue {
    resolve(row, requested)
        .map(DisplayValue::from)
        .unwrap_or(DisplayValue::Empty)
}

/// Every row formatted in declared column order.
pub fn display_rows(result: &ReportResult) -> Vec<Vec<DisplayValue>> {
    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|column| lookup(row, column))
                .collect()
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
