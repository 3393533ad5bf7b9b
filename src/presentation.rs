//! Render contexts for the dashboard pages.
//!
//! Pure assembly: everything here takes already-loaded data and shapes it
//! for the rendering layer. Loading of reference lists lives here too since
//! it follows the same scope rules.

use chrono::{Datelike, Month, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::authorization::{Principal, Scope};
use crate::db::repository::{self, ReferenceEntry};
use crate::filters::ReportFilter;
use crate::formatter::{display_rows, DisplayValue};
use crate::report::{
    CategoryStat, DashboardCharts, Fetched, ReportResult, ReportRow, ReportSection, TopPerformer,
};

/// First year with plan data. Year selectors start here.
pub const FIRST_REPORT_YEAR: i32 = 2025;

pub const MANAGER_PAGE_TITLE: &str = "Plan vs. fact comparison";
pub const RESTRICTED_PAGE_TITLE: &str = "My metrics";

// ═══════════════════════════════════════════════════════════
// Reference lists
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLists {
    /// Populated for managers only.
    pub doctors: Fetched<Vec<ReferenceEntry<i64>>>,
    pub specializations: Fetched<Vec<ReferenceEntry<i64>>>,
    pub target_codes: Fetched<Vec<ReferenceEntry<String>>>,
    /// Roster name of the principal's own MIS binding.
    pub own_name: Option<String>,
}

impl ReferenceLists {
    fn failures(&self) -> impl Iterator<Item = ReportSection> + '_ {
        [
            self.doctors.failure(),
            self.specializations.failure(),
            self.target_codes.failure(),
        ]
        .into_iter()
        .flatten()
        .map(|f| f.section)
    }
}

/// Load the filter-control lists visible to `scope`.
pub fn load_reference_lists(conn: &Connection, principal: &Principal, scope: &Scope) -> ReferenceLists {
    let doctors = match scope {
        Scope::Manager => Fetched::contain(ReportSection::Doctors, repository::list_doctors(conn)),
        Scope::Restricted { .. } => Fetched::Complete(Vec::new()),
    };

    let own_name = principal.external_id.and_then(|manid| {
        repository::doctor_name(conn, manid).unwrap_or_else(|e| {
            tracing::warn!(manid, error = %e, "Doctor name lookup failed");
            None
        })
    });

    ReferenceLists {
        doctors,
        specializations: Fetched::contain(
            ReportSection::Specializations,
            repository::list_specializations(conn),
        ),
        target_codes: Fetched::contain(
            ReportSection::TargetCodes,
            repository::list_target_codes(conn),
        ),
        own_name,
    }
}

// ═══════════════════════════════════════════════════════════
// Shared pieces
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOption {
    pub value: u32,
    pub name: &'static str,
}

pub fn month_options() -> Vec<MonthOption> {
    (1u8..=12)
        .filter_map(|m| Month::try_from(m).ok())
        .map(|month| MonthOption {
            value: month.number_from_month(),
            name: month.name(),
        })
        .collect()
}

/// `FIRST_REPORT_YEAR..=today.year() + ahead`.
pub fn year_options(today: NaiveDate, ahead: i32) -> Vec<i32> {
    (FIRST_REPORT_YEAR..=today.year() + ahead).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub login: String,
    pub display_name: String,
}

impl CurrentUser {
    pub fn new(principal: &Principal, own_name: Option<&str>) -> Self {
        Self {
            login: principal.login.clone(),
            display_name: own_name.unwrap_or(&principal.login).to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Plan/fact page
// ═══════════════════════════════════════════════════════════

/// Effective filter values as form-control strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormFilters {
    pub man_id: String,
    pub specid: String,
    pub stat_purpose_codes: Vec<String>,
}

impl From<&ReportFilter> for FormFilters {
    fn from(filter: &ReportFilter) -> Self {
        Self {
            man_id: filter.external_id.map(|id| id.to_string()).unwrap_or_default(),
            specid: filter.category_id.map(|id| id.to_string()).unwrap_or_default(),
            stat_purpose_codes: filter
                .target_codes
                .as_ref()
                .map(|codes| codes.as_slice().to_vec())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    pub year: i32,
    pub month: u32,
    pub columns: Vec<String>,
    pub data: Vec<ReportRow>,
    pub display_rows: Vec<Vec<DisplayValue>>,
    pub total: usize,
    pub is_restricted_view: bool,
    pub current_user: CurrentUser,
    pub doctor_id: Option<i64>,
    pub doctor_name: Option<String>,
    pub form_filters: FormFilters,
    pub doctors: Vec<ReferenceEntry<i64>>,
    pub specializations: Vec<ReferenceEntry<i64>>,
    pub purposes: Vec<ReferenceEntry<String>>,
    pub months: Vec<MonthOption>,
    pub years: Vec<i32>,
    pub page_title: &'static str,
    pub degraded_sections: Vec<ReportSection>,
}

/// Shape the plan/fact page for `principal` under its resolved `scope`.
pub fn assemble(
    principal: &Principal,
    scope: &Scope,
    filter: &ReportFilter,
    report: Fetched<ReportResult>,
    references: ReferenceLists,
    today: NaiveDate,
) -> RenderContext {
    let is_restricted_view = scope.is_restricted();

    let mut degraded_sections: Vec<ReportSection> =
        report.failure().map(|f| f.section).into_iter().collect();
    degraded_sections.extend(references.failures());

    let current_user = CurrentUser::new(principal, references.own_name.as_deref());
    let (doctor_id, doctor_name) = match scope {
        Scope::Restricted { external_id } => {
            (Some(*external_id), Some(current_user.display_name.clone()))
        }
        Scope::Manager => (None, None),
    };

    let result = report.into_data();
    let display_rows = display_rows(&result);
    let ReportResult { columns, rows } = result;

    RenderContext {
        year: filter.year,
        month: filter.month,
        total: rows.len(),
        columns,
        data: rows,
        display_rows,
        is_restricted_view,
        current_user,
        doctor_id,
        doctor_name,
        form_filters: FormFilters::from(filter),
        doctors: if is_restricted_view {
            Vec::new()
        } else {
            references.doctors.into_data()
        },
        specializations: references.specializations.into_data(),
        purposes: references.target_codes.into_data(),
        months: month_options(),
        years: year_options(today, 1),
        page_title: if is_restricted_view {
            RESTRICTED_PAGE_TITLE
        } else {
            MANAGER_PAGE_TITLE
        },
        degraded_sections,
    }
}

// ═══════════════════════════════════════════════════════════
// Manager dashboard
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardContext {
    pub year: i32,
    pub month: u32,
    pub top_doctors: Vec<TopPerformer>,
    pub specialization_stats: Vec<CategoryStat>,
    pub months: Vec<MonthOption>,
    pub years: Vec<i32>,
    pub current_user: CurrentUser,
    pub degraded_sections: Vec<ReportSection>,
}

pub fn assemble_dashboard(
    current_user: CurrentUser,
    year: i32,
    month: u32,
    charts: DashboardCharts,
    today: NaiveDate,
) -> DashboardContext {
    let degraded_sections = [
        charts.top_performers.failure(),
        charts.category_stats.failure(),
    ]
    .into_iter()
    .flatten()
    .map(|f| f.section)
    .collect();

    DashboardContext {
        year,
        month,
        top_doctors: charts.top_performers.into_data(),
        specialization_stats: charts.category_stats.into_data(),
        months: month_options(),
        years: year_options(today, 0),
        current_user,
        degraded_sections,
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
