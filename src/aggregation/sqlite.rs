//! SQL-backed aggregation functions.
//!
//! Each function is a single SQL statement with named parameters. The
//! built-in statements live in `resources/sql/`; a deployment can replace
//! any of them with a file of the same name in the configured SQL
//! directory. Parameters a statement does not mention are left unbound.

use std::path::Path;

use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::{
    AggregationError, AggregationSource, SpecializationStatRecord, TabularResult, TopDoctorRecord,
};
use crate::filters::ReportFilter;
use crate::report::ReportValue;

const TOP_DOCTORS_FILE: &str = "top_doctors.sql";
const SPECIALIZATION_STATS_FILE: &str = "specialization_stats.sql";
const MONTHLY_PLAN_FACT_FILE: &str = "monthly_plan_fact.sql";

// ═══════════════════════════════════════════════════════════
// Statement registry
// ═══════════════════════════════════════════════════════════

/// SQL text of the three aggregation functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationQueries {
    pub top_doctors: String,
    pub specialization_stats: String,
    pub monthly_plan_fact: String,
}

impl Default for AggregationQueries {
    fn default() -> Self {
        Self {
            top_doctors: include_str!("../../resources/sql/top_doctors.sql").to_string(),
            specialization_stats: include_str!("../../resources/sql/specialization_stats.sql")
                .to_string(),
            monthly_plan_fact: include_str!("../../resources/sql/monthly_plan_fact.sql")
                .to_string(),
        }
    }
}

impl AggregationQueries {
    /// Built-in statements, overridden by same-named files in `sql_dir`.
    pub fn load(sql_dir: Option<&Path>) -> std::io::Result<Self> {
        let mut queries = Self::default();
        let Some(dir) = sql_dir else {
            return Ok(queries);
        };

        for (file, slot) in [
            (TOP_DOCTORS_FILE, &mut queries.top_doctors),
            (SPECIALIZATION_STATS_FILE, &mut queries.specialization_stats),
            (MONTHLY_PLAN_FACT_FILE, &mut queries.monthly_plan_fact),
        ] {
            let path = dir.join(file);
            if path.is_file() {
                *slot = std::fs::read_to_string(&path)?;
                tracing::info!(path = %path.display(), "Loaded aggregation override");
            }
        }
        Ok(queries)
    }
}

// ═══════════════════════════════════════════════════════════
// SQLite source
// ═══════════════════════════════════════════════════════════

/// Aggregation functions evaluated on one dashboard database connection.
pub struct SqliteAggregations<'a> {
    conn: &'a Connection,
    queries: &'a AggregationQueries,
}

impl<'a> SqliteAggregations<'a> {
    pub fn new(conn: &'a Connection, queries: &'a AggregationQueries) -> Self {
        Self { conn, queries }
    }

    /// Run one statement and capture its declared columns and all rows.
    fn run_tabular(
        &self,
        function: &'static str,
        sql: &str,
        binds: &[(&str, Value)],
    ) -> Result<TabularResult, AggregationError> {
        let mut stmt = self.conn.prepare(strip_terminator(sql))?;
        for (name, value) in binds {
            if let Some(index) = stmt.parameter_index(name)? {
                stmt.raw_bind_parameter(index, value)?;
            }
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                cells.push(value_from_ref(row.get_ref(index)?));
            }
            out.push(cells);
        }

        tracing::debug!(function, rows = out.len(), "Aggregation function returned");
        Ok(TabularResult { columns, rows: out })
    }
}

impl AggregationSource for SqliteAggregations<'_> {
    fn top_doctors(
        &self,
        year: i32,
        month: u32,
        limit: u32,
    ) -> Result<Vec<TopDoctorRecord>, AggregationError> {
        const FUNCTION: &str = "top_doctors";
        let table = self.run_tabular(
            FUNCTION,
            &self.queries.top_doctors,
            &[
                (":year", Value::Integer(year.into())),
                (":month", Value::Integer(month.into())),
                (":limit", Value::Integer(limit.into())),
            ],
        )?;
        require_columns(FUNCTION, &table, 3)?;

        table
            .rows
            .iter()
            .map(|row| {
                Ok(TopDoctorRecord {
                    doctor_name: text_at(row, 0),
                    specialization: text_at(row, 1),
                    avg_percentage: decimal_at(FUNCTION, row, 2)?,
                })
            })
            .collect()
    }

    fn specialization_stats(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<SpecializationStatRecord>, AggregationError> {
        const FUNCTION: &str = "specialization_stats";
        let table = self.run_tabular(
            FUNCTION,
            &self.queries.specialization_stats,
            &[
                (":year", Value::Integer(year.into())),
                (":month", Value::Integer(month.into())),
            ],
        )?;
        require_columns(FUNCTION, &table, 5)?;

        table
            .rows
            .iter()
            .map(|row| {
                Ok(SpecializationStatRecord {
                    specialization: text_at(row, 0),
                    doctor_count: integer_at(FUNCTION, row, 1)?,
                    avg_percentage: decimal_at(FUNCTION, row, 2)?,
                    total_plan: decimal_at(FUNCTION, row, 3)?,
                    total_fact: decimal_at(FUNCTION, row, 4)?,
                })
            })
            .collect()
    }

    fn monthly_plan_fact(&self, filter: &ReportFilter) -> Result<TabularResult, AggregationError> {
        let optional = |v: Option<i64>| v.map(Value::Integer).unwrap_or(Value::Null);
        let codes = filter
            .target_codes
            .as_ref()
            .map(|c| Value::Text(c.to_json()))
            .unwrap_or(Value::Null);

        self.run_tabular(
            "monthly_plan_fact",
            &self.queries.monthly_plan_fact,
            &[
                (":year", Value::Integer(filter.year.into())),
                (":month", Value::Integer(filter.month.into())),
                (":man_id", optional(filter.external_id)),
                (":specid", optional(filter.category_id)),
                (":purpose_codes", codes),
            ],
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Value conversion
// ═══════════════════════════════════════════════════════════

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Map a SQLite cell. REALs outside the `Decimal` range keep their float text.
fn value_from_ref(value: ValueRef<'_>) -> ReportValue {
    match value {
        ValueRef::Null => ReportValue::Null,
        ValueRef::Integer(i) => ReportValue::Integer(i),
        ValueRef::Real(f) => Decimal::from_f64(f)
            .map(ReportValue::Decimal)
            .unwrap_or_else(|| ReportValue::Text(f.to_string())),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            ReportValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn require_columns(
    function: &'static str,
    table: &TabularResult,
    expected: usize,
) -> Result<(), AggregationError> {
    if table.columns.len() < expected {
        return Err(AggregationError::Shape {
            function,
            expected,
            actual: table.columns.len(),
        });
    }
    Ok(())
}

fn text_at(row: &[ReportValue], index: usize) -> Option<String> {
    match row.get(index)? {
        ReportValue::Null => None,
        ReportValue::Text(s) => Some(s.clone()),
        ReportValue::Integer(i) => Some(i.to_string()),
        ReportValue::Decimal(d) => Some(d.to_string()),
    }
}

fn decimal_at(
    function: &'static str,
    row: &[ReportValue],
    index: usize,
) -> Result<Option<Decimal>, AggregationError> {
    match row.get(index) {
        None | Some(ReportValue::Null) => Ok(None),
        Some(ReportValue::Integer(i)) => Ok(Some(Decimal::from(*i))),
        Some(ReportValue::Decimal(d)) => Ok(Some(*d)),
        Some(ReportValue::Text(s)) => s.trim().parse::<Decimal>().map(Some).map_err(|e| {
            AggregationError::Conversion {
                function,
                column: index,
                reason: e.to_string(),
            }
        }),
    }
}

fn integer_at(
    function: &'static str,
    row: &[ReportValue],
    index: usize,
) -> Result<Option<i64>, AggregationError> {
    let conversion = |reason: String| AggregationError::Conversion {
        function,
        column: index,
        reason,
    };
    match row.get(index) {
        None | Some(ReportValue::Null) => Ok(None),
        Some(ReportValue::Integer(i)) => Ok(Some(*i)),
        Some(ReportValue::Decimal(d)) if d.fract().is_zero() => d
            .to_i64()
            .map(Some)
            .ok_or_else(|| conversion(format!("{d} out of range"))),
        Some(ReportValue::Decimal(d)) => Err(conversion(format!("{d} is not an integer"))),
        Some(ReportValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| conversion(e.to_string())),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

/// Reference data plus 2025 plans and March 2025 facts.
///
/// Completion for March 2025:
/// - Ivanova (42, Therapy): Consultation 90/100, Preventive 20/20 → avg 95
/// - Petrov (43, Therapy): Consultation 50/100, Preventive 0/20 → avg 25
/// - Sidorov (77, Cardiology): Consultation 50/50 → 100
/// - unnamed (99, Cardiology): Consultation 25/50 → 50
#[cfg(test)]
pub(crate) fn seed_kpi_fixture(conn: &Connection) {
    crate::db::repository::seed_reference_data(conn);
    conn.execute_batch(
        "INSERT INTO plans (year, specid, plan_vistype, plan_value) VALUES
             (2025, 1, 10, 1200),
             (2025, 1, 20, 240),
             (2025, 2, 10, 600);
         INSERT INTO facts (year, month, man_id, stat_purpose_code, visit_count) VALUES
             (2025, 3, 42, 'C1', 60),
             (2025, 3, 42, 'C2', 30),
             (2025, 3, 42, 'P1', 20),
             (2025, 3, 43, 'C1', 50),
             (2025, 3, 77, 'C1', 50),
             (2025, 3, 99, 'C2', 25),
             (2025, 4, 42, 'C1', 1000);",
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::Scope;
    use crate::db::sqlite::open_memory_database;
    use crate::filters::{normalize, QueryParams};
    use chrono::NaiveDate;

    fn setup() -> Connection {
        let conn = open_memory_database().unwrap();
        seed_kpi_fixture(&conn);
        conn
    }

    fn filter(pairs: &[(&str, &str)]) -> ReportFilter {
        let params: QueryParams = pairs.iter().copied().collect();
        normalize(
            &params,
            &Scope::Manager,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        )
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn top_doctors_ranked_with_null_name_preserved() {
        let conn = setup();
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let rows = source.top_doctors(2025, 3, 5).unwrap();
        let pct: Vec<_> = rows.iter().map(|r| r.avg_percentage.unwrap()).collect();
        assert_eq!(pct, vec![dec("100"), dec("95"), dec("50"), dec("25")]);
        assert_eq!(rows[0].doctor_name.as_deref(), Some("Sidorov C."));
        assert_eq!(rows[2].doctor_name, None);
        assert_eq!(rows[2].specialization.as_deref(), Some("Cardiology"));
    }

    #[test]
    fn top_doctors_respects_limit() {
        let conn = setup();
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);
        assert_eq!(source.top_doctors(2025, 3, 2).unwrap().len(), 2);
    }

    #[test]
    fn specialization_stats_rollup() {
        let conn = setup();
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let stats = source.specialization_stats(2025, 3).unwrap();
        assert_eq!(stats.len(), 2);
        let cardio = &stats[0];
        assert_eq!(cardio.specialization.as_deref(), Some("Cardiology"));
        assert_eq!(cardio.doctor_count, Some(2));
        assert_eq!(cardio.avg_percentage, Some(dec("75")));
        assert_eq!(cardio.total_plan, Some(dec("100")));
        assert_eq!(cardio.total_fact, Some(dec("75")));

        let therapy = &stats[1];
        assert_eq!(therapy.avg_percentage, Some(dec("60")));
        assert_eq!(therapy.total_plan, Some(dec("240")));
        assert_eq!(therapy.total_fact, Some(dec("160")));
    }

    #[test]
    fn monthly_comparison_columns_come_from_statement() {
        let conn = setup();
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let table = source
            .monthly_plan_fact(&filter(&[("year", "2025"), ("month", "3")]))
            .unwrap();
        assert_eq!(
            table.columns,
            vec![
                "Doctor",
                "Specialization",
                "Visit purpose",
                "Monthly plan",
                "Fact",
                "Completion %"
            ]
        );
        assert_eq!(table.rows.len(), 6);
        assert!(table.rows.iter().all(|r| r.len() == 6));
    }

    #[test]
    fn monthly_comparison_applies_all_filters() {
        let conn = setup();
        let queries = AggregationQueries::default();
        let source = SqliteAggregations::new(&conn, &queries);

        let by_doctor = source
            .monthly_plan_fact(&filter(&[("man_id", "42")]))
            .unwrap();
        assert_eq!(by_doctor.rows.len(), 2);
        assert_eq!(by_doctor.rows[0][4], ReportValue::Integer(90));
        assert_eq!(by_doctor.rows[0][5], ReportValue::Decimal(dec("90")));

        let by_spec = source.monthly_plan_fact(&filter(&[("specid", "2")])).unwrap();
        assert_eq!(by_spec.rows.len(), 2);

        let by_code = source
            .monthly_plan_fact(&filter(&[("stat_purpose_codes", "P1")]))
            .unwrap();
        assert_eq!(by_code.rows.len(), 2);
        assert!(by_code
            .rows
            .iter()
            .all(|r| r[2] == ReportValue::Text("Preventive exam".into())));
    }

    #[test]
    fn override_can_change_shape_and_skip_parameters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MONTHLY_PLAN_FACT_FILE),
            "SELECT :year AS \"Year\", 'x' AS \"Marker\";",
        )
        .unwrap();
        let queries = AggregationQueries::load(Some(dir.path())).unwrap();
        assert_eq!(queries.top_doctors, AggregationQueries::default().top_doctors);

        let conn = setup();
        let source = SqliteAggregations::new(&conn, &queries);
        let table = source.monthly_plan_fact(&filter(&[("year", "2024")])).unwrap();
        assert_eq!(table.columns, vec!["Year", "Marker"]);
        assert_eq!(table.rows, vec![vec![ReportValue::Integer(2024), ReportValue::Text("x".into())]]);
    }

    #[test]
    fn missing_function_is_database_error() {
        let conn = setup();
        let queries = AggregationQueries {
            monthly_plan_fact: "SELECT * FROM no_such_function".into(),
            ..AggregationQueries::default()
        };
        let source = SqliteAggregations::new(&conn, &queries);
        assert!(matches!(
            source.monthly_plan_fact(&filter(&[])),
            Err(AggregationError::Database(_))
        ));
    }

    #[test]
    fn narrow_fixed_shape_is_shape_error() {
        let conn = setup();
        let queries = AggregationQueries {
            top_doctors: "SELECT 'a', 'b'".into(),
            ..AggregationQueries::default()
        };
        let source = SqliteAggregations::new(&conn, &queries);
        assert!(matches!(
            source.top_doctors(2025, 3, 5),
            Err(AggregationError::Shape { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn text_percentage_is_conversion_error() {
        let conn = setup();
        let queries = AggregationQueries {
            top_doctors: "SELECT 'a', 'b', 'high'".into(),
            ..AggregationQueries::default()
        };
        let source = SqliteAggregations::new(&conn, &queries);
        assert!(matches!(
            source.top_doctors(2025, 3, 5),
            Err(AggregationError::Conversion { column: 2, .. })
        ));
    }

    #[test]
    fn oversized_real_keeps_the_table() {
        let conn = setup();
        let queries = AggregationQueries {
            monthly_plan_fact: "SELECT 'ok' AS a, 1e30 AS b UNION ALL SELECT 'fine', 2.5".into(),
            ..AggregationQueries::default()
        };
        let source = SqliteAggregations::new(&conn, &queries);
        let table = source.monthly_plan_fact(&filter(&[])).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], ReportValue::Text(1e30_f64.to_string()));
        assert_eq!(table.rows[1][1], ReportValue::Decimal(dec("2.5")));
    }

    #[test]
    fn strip_terminator_handles_trailing_semicolon() {
        assert_eq!(strip_terminator("SELECT 1;\n"), "SELECT 1");
        assert_eq!(strip_terminator("  SELECT 1  "), "SELECT 1");
    }
}
