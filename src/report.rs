//! Report gateway.
//!
//! Calls the aggregation functions and adapts their output into stable
//! report structures. Failures never propagate past this module: a failed
//! section degrades to empty data and the failure travels alongside it in
//! `Fetched::Degraded`, so callers render partial pages and tests can
//! assert on the degraded path.

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::aggregation::{AggregationError, AggregationSource, TabularResult};
use crate::filters::ReportFilter;

/// Fixed size of the top-performers chart.
pub const TOP_PERFORMERS_LIMIT: u32 = 5;

// ═══════════════════════════════════════════════════════════
// Values, rows, results
// ═══════════════════════════════════════════════════════════

/// Scalar cell value returned by an aggregation function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    Null,
    Integer(i64),
    Decimal(Decimal),
    Text(String),
}

/// Ordered column → value mapping. Keys always equal the owning
/// `ReportResult::columns`, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportRow {
    cells: Vec<(String, ReportValue)>,
}

impl ReportRow {
    /// Value under exactly `key` (first occurrence if a name repeats).
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReportValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ReportValue)> for ReportRow {
    fn from_iter<T: IntoIterator<Item = (K, ReportValue)>>(iter: T) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Monthly comparison: declared column order plus keyed rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReportResult {
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Key every positional row by the declared columns. A row whose width
    /// differs from the column list is a malformed result.
    pub fn from_tabular(table: TabularResult) -> Result<Self, AggregationError> {
        let TabularResult { columns, rows } = table;
        let width = columns.len();

        let rows = rows
            .into_iter()
            .map(|values| {
                if values.len() != width {
                    return Err(AggregationError::Shape {
                        function: "monthly_plan_fact",
                        expected: width,
                        actual: values.len(),
                    });
                }
                Ok(columns.iter().cloned().zip(values).collect())
            })
            .collect::<Result<Vec<ReportRow>, _>>()?;

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════
// Degradation
// ═══════════════════════════════════════════════════════════

/// Page section that can degrade independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    TopPerformers,
    CategoryStats,
    MonthlyComparison,
    Doctors,
    Specializations,
    TargetCodes,
}

impl ReportSection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopPerformers => "top_performers",
            Self::CategoryStats => "category_stats",
            Self::MonthlyComparison => "monthly_comparison",
            Self::Doctors => "doctors",
            Self::Specializations => "specializations",
            Self::TargetCodes => "target_codes",
        }
    }
}

/// Recorded failure of one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationFailure {
    pub section: ReportSection,
    pub message: String,
}

/// Section data that either loaded fully or degraded to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Complete(T),
    Degraded { data: T, failure: AggregationFailure },
}

impl<T> Fetched<T> {
    pub fn data(&self) -> &T {
        match self {
            Fetched::Complete(data) | Fetched::Degraded { data, .. } => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Fetched::Complete(data) | Fetched::Degraded { data, .. } => data,
        }
    }

    pub fn failure(&self) -> Option<&AggregationFailure> {
        match self {
            Fetched::Complete(_) => None,
            Fetched::Degraded { failure, .. } => Some(failure),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failure().is_some()
    }
}

impl<T: Default> Fetched<T> {
    /// Contain `result` at the section boundary: errors become `T::default()`.
    pub fn contain<E: std::fmt::Display>(section: ReportSection, result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Fetched::Complete(data),
            Err(e) => {
                tracing::warn!(section = section.as_str(), error = %e, "Report section degraded");
                Fetched::Degraded {
                    data: T::default(),
                    failure: AggregationFailure {
                        section,
                        message: e.to_string(),
                    },
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Dashboard charts
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPerformer {
    pub name: Option<String>,
    pub category: Option<String>,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStat {
    pub category: Option<String>,
    pub count: i64,
    pub avg_percentage: Decimal,
    pub total_plan: Decimal,
    pub total_actual: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardCharts {
    pub top_performers: Fetched<Vec<TopPerformer>>,
    pub category_stats: Fetched<Vec<CategoryStat>>,
}

/// Empty strings count as missing labels.
fn label(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Top-5 doctors and the per-specialization rollup for one month.
/// Each half degrades on its own.
pub fn get_top_performers_and_category_stats(
    source: &dyn AggregationSource,
    year: i32,
    month: u32,
) -> DashboardCharts {
    let top_performers = Fetched::contain(
        ReportSection::TopPerformers,
        source
            .top_doctors(year, month, TOP_PERFORMERS_LIMIT)
            .map(|rows| {
                rows.into_iter()
                    .take(TOP_PERFORMERS_LIMIT as usize)
                    .map(|r| TopPerformer {
                        name: label(r.doctor_name),
                        category: label(r.specialization),
                        percentage: r.avg_percentage.unwrap_or(Decimal::ZERO),
                    })
                    .collect()
            }),
    );

    let category_stats = Fetched::contain(
        ReportSection::CategoryStats,
        source.specialization_stats(year, month).map(|rows| {
            rows.into_iter()
                .map(|r| CategoryStat {
                    category: label(r.specialization),
                    count: r.doctor_count.unwrap_or(0),
                    avg_percentage: r.avg_percentage.unwrap_or(Decimal::ZERO),
                    total_plan: r.total_plan.unwrap_or(Decimal::ZERO),
                    total_actual: r.total_fact.unwrap_or(Decimal::ZERO),
                })
                .collect()
        }),
    );

    DashboardCharts {
        top_performers,
        category_stats,
    }
}

/// Monthly plan/fact comparison for an already-normalized filter.
pub fn get_monthly_comparison(
    source: &dyn AggregationSource,
    filter: &ReportFilter,
) -> Fetched<ReportResult> {
    Fetched::contain(
        ReportSection::MonthlyComparison,
        source
            .monthly_plan_fact(filter)
            .and_then(ReportResult::from_tabular),
    )
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregation::sqlite::seed_kpi_fixture;
    use crate::aggregation::{AggregationQueries, SpecializationStatRecord, SqliteAggregations, TopDoctorRecord};
    use crate::authorization::Scope;
    use crate::db::sqlite::open_memory_database;
    use crate::filters::{normalize, QueryParams};
    use chrono::NaiveDate;

    /// Source whose every function fails.
    pub(crate) struct FailingSource;

    impl AggregationSource for FailingSource {
        fn top_doctors(&self, _: i32, _: u32, _: u32) -> Result<Vec<TopDoctorRecord>, AggregationError> {
            Err(AggregationError::Database(rusqlite::Error::InvalidQuery))
        }

        fn specialization_stats(
            &self,
            _: i32,
            _: u32,
        ) -> Result<Vec<SpecializationStatRecord>, AggregationError> {
            Err(AggregationError::Database(rusqlite::Error::InvalidQuery))
        }

        fn monthly_plan_fact(&self, _: &ReportFilter) -> Result<TabularResult, AggregationError> {
            Err(AggregationError::Database(rusqlite::Error::InvalidQuery))
        }
    }

    /// Source returning canned rows.
    #[derive(Default)]
    struct CannedSource {
        top: Vec<TopDoctorRecord>,
        stats: Vec<SpecializationStatRecord>,
        table: TabularResult,
        stats_fail: bool,
    }

    impl AggregationSource for CannedSource {
        fn top_doctors(&self, _: i32, _: u32, _: u32) -> Result<Vec<TopDoctorRecord>, AggregationError> {
            Ok(self.top.clone())
        }

        fn specialization_stats(
            &self,
            _: i32,
            _: u32,
        ) -> Result<Vec<SpecializationStatRecord>, AggregationError> {
            if self.stats_fail {
                return Err(AggregationError::Shape {
                    function: "specialization_stats",
                    expected: 5,
                    actual: 1,
                });
            }
            Ok(self.stats.clone())
        }

        fn monthly_plan_fact(&self, _: &ReportFilter) -> Result<TabularResult, AggregationError> {
            Ok(self.table.clone())
        }
    }

    fn march_2025() -> ReportFilter {
        normalize(
            &QueryParams::default(),
            &Scope::Manager,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
    }

    #[test]
    fn failing_comparison_returns_empty_result() {
        let fetched = get_monthly_comparison(&FailingSource, &march_2025());
        assert!(fetched.is_degraded());
        assert_eq!(
            fetched.failure().unwrap().section,
            ReportSection::MonthlyComparison
        );
        assert_eq!(fetched.into_data(), ReportResult { columns: vec![], rows: vec![] });
    }

    #[test]
    fn failing_charts_degrade_independently() {
        let source = CannedSource {
            top: vec![TopDoctorRecord::default()],
            stats_fail: true,
            ..Default::default()
        };
        let charts = get_top_performers_and_category_stats(&source, 2025, 3);
        assert!(!charts.top_performers.is_degraded());
        assert_eq!(charts.top_performers.data().len(), 1);
        assert!(charts.category_stats.is_degraded());
        assert!(charts.category_stats.data().is_empty());
    }

    #[test]
    fn all_failing_charts_are_empty() {
        let charts = get_top_performers_and_category_stats(&FailingSource, 2025, 3);
        assert!(charts.top_performers.data().is_empty());
        assert!(charts.category_stats.data().is_empty());
        assert!(charts.top_performers.is_degraded() && charts.category_stats.is_degraded());
    }

    #[test]
    fn nulls_defaulted_but_names_preserved() {
        let source = CannedSource {
            top: vec![TopDoctorRecord {
                doctor_name: None,
                specialization: Some(String::new()),
                avg_percentage: None,
            }],
            stats: vec![SpecializationStatRecord::default()],
            ..Default::default()
        };
        let charts = get_top_performers_and_category_stats(&source, 2025, 3);
        let top = &charts.top_performers.data()[0];
        assert_eq!(top.name, None);
        assert_eq!(top.category, None);
        assert_eq!(top.percentage, Decimal::ZERO);

        let stat = &charts.category_stats.data()[0];
        assert_eq!(stat.category, None);
        assert_eq!(stat.count, 0);
        assert_eq!(stat.total_plan, Decimal::ZERO);
        assert_eq!(stat.total_actual, Decimal::ZERO);
    }

    #[test]
    fn top_performers_capped_at_five_in_source_order() {
        let top = (0..8)
            .map(|i| TopDoctorRecord {
                doctor_name: Some(format!("D{i}")),
                specialization: None,
                avg_percentage: Some(Decimal::from(100 - i)),
            })
            .collect();
        let source = CannedSource {
            top,
            ..Default::default()
        };
        let charts = get_top_performers_and_category_stats(&source, 2025, 3);
        let names: Vec<_> = charts
            .top_performers
            .data()
            .iter()
            .map(|t| t.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["D0", "D1", "D2", "D3", "D4"]);
    }

    #[test]
    fn manager_scenario_on_database() {
        let conn = open_memory_database().unwrap();
        seed_kpi_fixture(&conn);
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let charts = get_top_performers_and_category_stats(&source, 2025, 3);
        let top = charts.top_performers.data();
        assert!(top.len() <= 5);
        assert_eq!(top.len(), 4);
        assert_eq!(top[2].name, None);
        assert_eq!(charts.category_stats.data().len(), 2);
    }

    #[test]
    fn comparison_rows_keyed_by_columns_in_order() {
        let conn = open_memory_database().unwrap();
        seed_kpi_fixture(&conn);
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let result = get_monthly_comparison(&source, &march_2025()).into_data();
        assert_eq!(result.len(), 6);
        for row in &result.rows {
            let keys: Vec<_> = row.keys().collect();
            assert_eq!(keys, result.columns.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[test]
    fn ragged_table_degrades() {
        let source = CannedSource {
            table: TabularResult {
                columns: vec!["a".into(), "b".into()],
                rows: vec![vec![ReportValue::Null]],
            },
            ..Default::default()
        };
        let fetched = get_monthly_comparison(&source, &march_2025());
        assert!(fetched.is_degraded());
        assert!(fetched.data().is_empty());
        assert!(fetched.data().columns.is_empty());
    }

    #[test]
    fn row_serializes_as_ordered_map() {
        let row: ReportRow = vec![
            ("z", ReportValue::Integer(1)),
            ("a", ReportValue::Null),
            ("m", ReportValue::Text("x".into())),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"z":1,"a":null,"m":"x"}"#);
    }
}
