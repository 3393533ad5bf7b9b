//! Annual plan administration: listing, edits, CSV exchange and bulk delete.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::repository::{self, NewPlan, PlanFilter, PlanListing, PlanRecord, ReferenceEntry};
use crate::db::DatabaseError;

/// Column order of the plan import file.
pub const IMPORT_HEADER: [&str; 4] = ["year", "specid", "plan_vistype", "plan_value"];

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan {0} not found")]
    NotFound(i64),

    #[error("A plan for {year}, specialization {specid}, purpose {plan_vistype} already exists")]
    Duplicate {
        year: i32,
        specid: i64,
        plan_vistype: i64,
    },

    #[error("Plan value must be non-negative, got {0}")]
    NegativeValue(i64),

    #[error("Year is required")]
    YearRequired,

    #[error("Invalid CSV: {0}")]
    InvalidCsv(String),

    #[error("CSV export failed: {0}")]
    Export(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Monthly share of an annual plan, rounded down.
pub fn monthly_plan(plan_value: i64) -> i64 {
    plan_value.div_euclid(12)
}

// ═══════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════

/// A plan as shown in the admin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanView {
    pub keyid: i64,
    pub year: i32,
    pub specid: i64,
    pub plan_vistype: i64,
    pub plan_value: i64,
    pub monthly_plan: i64,
    pub spec_name: String,
    pub purpose_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PlanListing> for PlanView {
    fn from(listing: PlanListing) -> Self {
        let PlanListing {
            plan,
            spec_name,
            purpose_name,
        } = listing;
        Self {
            spec_name: spec_name.unwrap_or_else(|| format!("ID: {}", plan.specid)),
            purpose_name: purpose_name.unwrap_or_else(|| format!("Purpose: {}", plan.plan_vistype)),
            monthly_plan: monthly_plan(plan.plan_value),
            keyid: plan.keyid,
            year: plan.year,
            specid: plan.specid,
            plan_vistype: plan.plan_vistype,
            plan_value: plan.plan_value,
            created_at: plan.created_at,
            updated_at: plan.updated_at,
        }
    }
}

pub fn list_plan_views(conn: &Connection, filter: &PlanFilter) -> Result<Vec<PlanView>, PlanError> {
    Ok(repository::list_plans(conn, filter)?
        .into_iter()
        .map(PlanView::from)
        .collect())
}

fn fetch_view(conn: &Connection, keyid: i64) -> Result<PlanView, PlanError> {
    repository::get_plan(conn, keyid)?
        .map(PlanView::from)
        .ok_or(PlanError::NotFound(keyid))
}

fn not_found_as(keyid: i64) -> impl FnOnce(DatabaseError) -> PlanError {
    move |e| match e {
        DatabaseError::NotFound { .. } => PlanError::NotFound(keyid),
        other => PlanError::Database(other),
    }
}

// ═══════════════════════════════════════════════════════════
// Single-plan edits
// ═══════════════════════════════════════════════════════════

pub fn create_plan(conn: &Connection, plan: &NewPlan) -> Result<PlanView, PlanError> {
    if plan.plan_value < 0 {
        return Err(PlanError::NegativeValue(plan.plan_value));
    }
    let keyid = repository::insert_plan(conn, plan).map_err(|e| match e {
        DatabaseError::ConstraintViolation(_) => PlanError::Duplicate {
            year: plan.year,
            specid: plan.specid,
            plan_vistype: plan.plan_vistype,
        },
        other => PlanError::Database(other),
    })?;
    tracing::info!(keyid, year = plan.year, specid = plan.specid, "Plan created");
    fetch_view(conn, keyid)
}

pub fn update_plan(conn: &Connection, keyid: i64, plan_value: i64) -> Result<PlanView, PlanError> {
    if plan_value < 0 {
        return Err(PlanError::NegativeValue(plan_value));
    }
    repository::update_plan_value(conn, keyid, plan_value).map_err(not_found_as(keyid))?;
    fetch_view(conn, keyid)
}

pub fn remove_plan(conn: &Connection, keyid: i64) -> Result<(), PlanError> {
    repository::delete_plan(conn, keyid).map_err(not_found_as(keyid))?;
    tracing::info!(keyid, "Plan deleted");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// CSV export
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct SelectedExportRow<'a> {
    year: i32,
    specid: i64,
    plan_vistype: i64,
    plan_value: i64,
    spec_name: &'a str,
    purpose_name: &'a str,
}

#[derive(Serialize)]
struct FullExportRow<'a> {
    year: i32,
    specid: i64,
    plan_vistype: i64,
    plan_value: i64,
    created_at: &'a str,
    updated_at: &'a str,
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, PlanError> {
    writer
        .into_inner()
        .map_err(|e| PlanError::Export(e.to_string()))
}

/// Selected plans with their reference names.
pub fn export_selected_csv(conn: &Connection, ids: &[i64]) -> Result<Vec<u8>, PlanError> {
    let views: Vec<PlanView> = repository::list_plans_by_ids(conn, ids)?
        .into_iter()
        .map(PlanView::from)
        .collect();

    let mut wtr = csv::Writer::from_writer(Vec::new());
    if views.is_empty() {
        wtr.write_record([
            "year",
            "specid",
            "plan_vistype",
            "plan_value",
            "spec_name",
            "purpose_name",
        ])
        .map_err(|e| PlanError::Export(e.to_string()))?;
    }
    for view in &views {
        wtr.serialize(SelectedExportRow {
            year: view.year,
            specid: view.specid,
            plan_vistype: view.plan_vistype,
            plan_value: view.plan_value,
            spec_name: &view.spec_name,
            purpose_name: &view.purpose_name,
        })
        .map_err(|e| PlanError::Export(e.to_string()))?;
    }
    tracing::info!(count = views.len(), "Exported selected plans");
    finish(wtr)
}

/// Every plan with timestamps.
pub fn export_all_csv(conn: &Connection) -> Result<Vec<u8>, PlanError> {
    let plans: Vec<PlanRecord> = repository::list_all_plans(conn)?;

    let mut wtr = csv::Writer::from_writer(Vec::new());
    if plans.is_empty() {
        wtr.write_record([
            "year",
            "specid",
            "plan_vistype",
            "plan_value",
            "created_at",
            "updated_at",
        ])
        .map_err(|e| PlanError::Export(e.to_string()))?;
    }
    for plan in &plans {
        wtr.serialize(FullExportRow {
            year: plan.year,
            specid: plan.specid,
            plan_vistype: plan.plan_vistype,
            plan_value: plan.plan_value,
            created_at: &plan.created_at,
            updated_at: &plan.updated_at,
        })
        .map_err(|e| PlanError::Export(e.to_string()))?;
    }
    finish(wtr)
}

// ═══════════════════════════════════════════════════════════
// CSV import
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ImportRow {
    year: i32,
    specid: i64,
    plan_vistype: i64,
    plan_value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub errors: usize,
}

/// Upsert every row of a plan CSV. Bad rows are counted, never fatal.
/// Extra columns are ignored.
pub fn import_csv(conn: &Connection, data: &[u8]) -> Result<ImportSummary, PlanError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| PlanError::InvalidCsv(format!("not UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| PlanError::InvalidCsv(e.to_string()))?;
    if let Some(missing) = IMPORT_HEADER
        .iter()
        .find(|name| !headers.iter().any(|h| h == **name))
    {
        return Err(PlanError::InvalidCsv(format!("missing column '{missing}'")));
    }

    let mut summary = ImportSummary {
        imported: 0,
        errors: 0,
    };
    for (line, result) in rdr.deserialize::<ImportRow>().enumerate() {
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|row| {
                if row.plan_value < 0 {
                    return Err(format!("negative plan value {}", row.plan_value));
                }
                repository::upsert_plan(
                    conn,
                    &NewPlan {
                        year: row.year,
                        specid: row.specid,
                        plan_vistype: row.plan_vistype,
                        plan_value: row.plan_value,
                    },
                )
                .map_err(|e| e.to_string())
            });
        match outcome {
            Ok(()) => summary.imported += 1,
            Err(reason) => {
                tracing::warn!(row = line + 1, %reason, "Plan import row rejected");
                summary.errors += 1;
            }
        }
    }

    tracing::info!(
        imported = summary.imported,
        errors = summary.errors,
        "Plan import finished"
    );
    Ok(summary)
}

// ═══════════════════════════════════════════════════════════
// Bulk delete
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDeleteOptions {
    pub years: Vec<i32>,
    pub specializations: Vec<ReferenceEntry<i64>>,
}

pub fn bulk_delete_options(conn: &Connection) -> Result<BulkDeleteOptions, PlanError> {
    Ok(BulkDeleteOptions {
        years: repository::list_plan_years(conn)?,
        specializations: repository::list_specializations(conn)?,
    })
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BulkDeleteRequest {
    pub year: Option<i32>,
    pub specid: Option<i64>,
}

/// Delete all plans of a year, optionally narrowed to one specialization.
pub fn bulk_delete(conn: &Connection, request: BulkDeleteRequest) -> Result<usize, PlanError> {
    let year = request.year.ok_or(PlanError::YearRequired)?;
    let deleted = repository::delete_plans_for_year(conn, year, request.specid)?;
    tracing::info!(year, specid = ?request.specid, deleted, "Plans bulk-deleted");
    Ok(deleted)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
