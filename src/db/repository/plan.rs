use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;

/// One annual plan row: target visits for a specialization and visit purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRecord {
    pub keyid: i64,
    pub specid: i64,
    pub plan_vistype: i64,
    pub plan_value: i64,
    pub year: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// A plan joined with its reference names (None when the reference row is gone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanListing {
    pub plan: PlanRecord,
    pub spec_name: Option<String>,
    pub purpose_name: Option<String>,
}

/// Admin list filter.
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub year: Option<i32>,
    /// Substring match against specid or purpose code.
    pub search: Option<String>,
}

/// Values for a new plan row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPlan {
    pub year: i32,
    pub specid: i64,
    pub plan_vistype: i64,
    pub plan_value: i64,
}

const PLAN_COLUMNS: &str =
    "p.keyid, p.specid, p.plan_vistype, p.plan_value, p.year, p.created_at, p.updated_at";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<PlanRecord> {
    Ok(PlanRecord {
        keyid: row.get(0)?,
        specid: row.get(1)?,
        plan_vistype: row.get(2)?,
        plan_value: row.get(3)?,
        year: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<PlanListing> {
    Ok(PlanListing {
        plan: plan_from_row(row)?,
        spec_name: row.get(7)?,
        purpose_name: row.get(8)?,
    })
}

fn listing_select() -> String {
    format!(
        "SELECT {PLAN_COLUMNS}, s.text, pu.text
         FROM plans p
         LEFT JOIN specialities s ON s.keyidmis = p.specid
         LEFT JOIN purposes pu ON pu.code = p.plan_vistype"
    )
}

pub fn list_plans(conn: &Connection, filter: &PlanFilter) -> Result<Vec<PlanListing>, DatabaseError> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let sql = format!(
        "{}
         WHERE (?1 IS NULL OR p.year = ?1)
           AND (?2 IS NULL
                OR CAST(p.specid AS TEXT) LIKE ?2
                OR CAST(p.plan_vistype AS TEXT) LIKE ?2)
         ORDER BY p.year DESC, p.specid, p.plan_vistype",
        listing_select()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![filter.year, pattern], listing_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_plans_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<PlanListing>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "{} WHERE p.keyid IN ({placeholders})
         ORDER BY p.year DESC, p.specid, p.plan_vistype",
        listing_select()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), listing_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All plans in export order (year desc, specid, purpose).
pub fn list_all_plans(conn: &Connection) -> Result<Vec<PlanRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {PLAN_COLUMNS} FROM plans p
         ORDER BY p.year DESC, p.specid, p.plan_vistype"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_plan(conn: &Connection, keyid: i64) -> Result<Option<PlanListing>, DatabaseError> {
    let sql = format!("{} WHERE p.keyid = ?1", listing_select());
    let plan = conn
        .query_row(&sql, params![keyid], listing_from_row)
        .optional()?;
    Ok(plan)
}

/// Insert a plan. A duplicate `(year, specid, plan_vistype)` is a `ConstraintViolation`.
pub fn insert_plan(conn: &Connection, plan: &NewPlan) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO plans (year, specid, plan_vistype, plan_value) VALUES (?1, ?2, ?3, ?4)",
        params![plan.year, plan.specid, plan.plan_vistype, plan.plan_value],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

/// Insert or overwrite the plan value for `(year, specid, plan_vistype)`.
pub fn upsert_plan(conn: &Connection, plan: &NewPlan) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO plans (year, specid, plan_vistype, plan_value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (year, specid, plan_vistype)
         DO UPDATE SET plan_value = excluded.plan_value,
                       updated_at = datetime('now')",
        params![plan.year, plan.specid, plan.plan_vistype, plan.plan_value],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn update_plan_value(conn: &Connection, keyid: i64, plan_value: i64) -> Result<(), DatabaseError> {
    let updated = conn
        .execute(
            "UPDATE plans SET plan_value = ?1, updated_at = datetime('now') WHERE keyid = ?2",
            params![plan_value, keyid],
        )
        .map_err(DatabaseError::from_write)?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "plan".into(),
            id: keyid.to_string(),
        });
    }
    Ok(())
}

pub fn delete_plan(conn: &Connection, keyid: i64) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM plans WHERE keyid = ?1", params![keyid])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "plan".into(),
            id: keyid.to_string(),
        });
    }
    Ok(())
}

/// Delete every plan of a year, or of a year and specialization.
pub fn delete_plans_for_year(
    conn: &Connection,
    year: i32,
    specid: Option<i64>,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM plans WHERE year = ?1 AND (?2 IS NULL OR specid = ?2)",
        params![year, specid],
    )?;
    Ok(deleted)
}

pub fn list_plan_years(conn: &Connection) -> Result<Vec<i32>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT DISTINCT year FROM plans ORDER BY year DESC")?;
    let years = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(years)
}
