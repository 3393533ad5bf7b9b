//! Aggregation functions: the plan/fact computations the reports are built on.
//!
//! `AggregationSource` is the seam between report assembly and whatever
//! computes the numbers. The production source runs SQL statements against
//! the dashboard database (`sqlite::SqliteAggregations`); tests substitute
//! in-memory or failing sources.

pub mod sqlite;

use rust_decimal::Decimal;

use crate::filters::ReportFilter;
use crate::report::ReportValue;

pub use sqlite::{AggregationQueries, SqliteAggregations};

/// One row of the top-doctors function. Every field may be NULL at the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopDoctorRecord {
    pub doctor_name: Option<String>,
    pub specialization: Option<String>,
    pub avg_percentage: Option<Decimal>,
}

/// One row of the specialization-stats function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecializationStatRecord {
    pub specialization: Option<String>,
    pub doctor_count: Option<i64>,
    pub avg_percentage: Option<Decimal>,
    pub total_plan: Option<Decimal>,
    pub total_fact: Option<Decimal>,
}

/// Column names plus positional rows, exactly as the function returned them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ReportValue>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{function} returned {actual} columns, expected at least {expected}")]
    Shape {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{function}: cannot convert column {column}: {reason}")]
    Conversion {
        function: &'static str,
        column: usize,
        reason: String,
    },
}

/// The three aggregation functions reports are built from.
pub trait AggregationSource {
    /// Doctors ranked by average plan completion, best first, at most `limit`.
    fn top_doctors(
        &self,
        year: i32,
        month: u32,
        limit: u32,
    ) -> Result<Vec<TopDoctorRecord>, AggregationError>;

    /// Per-specialization completion rollup.
    fn specialization_stats(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<SpecializationStatRecord>, AggregationError>;

    /// Monthly plan/fact comparison. The column set belongs to the function.
    fn monthly_plan_fact(&self, filter: &ReportFilter) -> Result<TabularResult, AggregationError>;
}
