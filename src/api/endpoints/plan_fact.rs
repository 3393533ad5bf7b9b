//! Unified plan/fact comparison page.
//!
//! `GET /api/dashboard/plan-fact?year&month&man_id&specid&stat_purpose_codes*`
//!
//! Scope → filter → report → render context. Managers may pick any doctor;
//! everyone else sees only their own MIS doctor id.

use axum::extract::{Query, State};
use axum::{Extension, Json};

use crate::aggregation::SqliteAggregations;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::resolve_scope;
use crate::filters::{normalize, QueryParams};
use crate::presentation::{assemble, load_reference_lists, RenderContext};
use crate::report::get_monthly_comparison;

pub async fn comparison(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<RenderContext>, ApiError> {
    let principal = &auth.principal;
    let scope = resolve_scope(principal)?;

    let today = ctx.today();
    let filter = normalize(&QueryParams::from(pairs), &scope, today);

    let conn = ctx.core.open_db()?;
    let queries = ctx.core.queries()?;
    let report = get_monthly_comparison(&SqliteAggregations::new(&conn, &queries), &filter);
    let references = load_reference_lists(&conn, principal, &scope);

    tracing::debug!(
        login = %principal.login,
        year = filter.year,
        month = filter.month,
        external_id = ?filter.external_id,
        rows = report.data().len(),
        "Plan/fact comparison"
    );

    Ok(Json(assemble(principal, &scope, &filter, report, references, today)))
}
