//! Report filter normalization.
//!
//! Turns loosely-typed query parameters into a typed `ReportFilter`.
//! Normalization is total: malformed values fall back to defaults and are
//! never reported to the caller. The restricted-scope override runs last.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::authorization::Scope;

pub const PARAM_YEAR: &str = "year";
pub const PARAM_MONTH: &str = "month";
pub const PARAM_EXTERNAL_ID: &str = "man_id";
pub const PARAM_CATEGORY_ID: &str = "specid";
pub const PARAM_TARGET_CODES: &str = "stat_purpose_codes";

// ═══════════════════════════════════════════════════════════
// Raw parameters
// ═══════════════════════════════════════════════════════════

/// Multi-valued query parameters in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Last value for `name`, matching form semantics where a repeated
    /// single-valued field keeps the last submission.
    pub fn last(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in request order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl From<Vec<(String, String)>> for QueryParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::new(pairs)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Typed filter
// ═══════════════════════════════════════════════════════════

/// Non-empty, de-duplicated set of target codes, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetCodes(Vec<String>);

impl TargetCodes {
    /// Trim entries and drop blanks. An empty result means "no restriction".
    pub fn from_raw<'a, I>(raw: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut codes: Vec<String> = Vec::new();
        for code in raw.into_iter().map(str::trim).filter(|c| !c.is_empty()) {
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
        if codes.is_empty() {
            None
        } else {
            Some(Self(codes))
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// JSON array form bound to the comparison function.
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.0.clone()).to_string()
    }
}

/// Validated filter set for the monthly comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFilter {
    pub year: i32,
    pub month: u32,
    pub external_id: Option<i64>,
    pub category_id: Option<i64>,
    pub target_codes: Option<TargetCodes>,
}

// ═══════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════

/// Year and month from the request.
///
/// A missing value defaults to `today` on its own. A value that is present
/// but invalid resets both to `today`.
pub fn normalize_period(params: &QueryParams, today: NaiveDate) -> (i32, u32) {
    let year = params.last(PARAM_YEAR).map(parse_year);
    let month = params.last(PARAM_MONTH).map(parse_month);

    match (year, month) {
        (Some(None), _) | (_, Some(None)) => (today.year(), today.month()),
        (year, month) => (
            year.flatten().unwrap_or_else(|| today.year()),
            month.flatten().unwrap_or_else(|| today.month()),
        ),
    }
}

/// Build the effective filter for `scope`.
pub fn normalize(params: &QueryParams, scope: &Scope, today: NaiveDate) -> ReportFilter {
    let (year, month) = normalize_period(params, today);

    let mut filter = ReportFilter {
        year,
        month,
        external_id: params.last(PARAM_EXTERNAL_ID).and_then(parse_optional_id),
        category_id: params.last(PARAM_CATEGORY_ID).and_then(parse_optional_id),
        target_codes: TargetCodes::from_raw(params.all(PARAM_TARGET_CODES)),
    };

    // Must stay last: a restricted principal can never pick another id.
    if let Scope::Restricted { external_id } = scope {
        filter.external_id = Some(*external_id);
    }

    filter
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

fn parse_month(raw: &str) -> Option<u32> {
    raw.trim().parse().ok().filter(|m| (1..=12).contains(m))
}

/// Empty → None; unparseable → None.
fn parse_optional_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
