//! Landing redirect and the manager dashboard.
//!
//! `GET /api/`: sends each principal to its home page
//! `GET /api/dashboard`: top doctors + specialization stats (managers only)

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};

use crate::aggregation::SqliteAggregations;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::is_manager;
use crate::db::repository;
use crate::filters::{normalize_period, QueryParams};
use crate::presentation::{assemble_dashboard, CurrentUser};
use crate::report::get_top_performers_and_category_stats;

pub const DASHBOARD_PATH: &str = "/api/dashboard";
pub const PLAN_FACT_PATH: &str = "/api/dashboard/plan-fact";

/// `GET /api/`: managers land on the dashboard, everyone else on plan/fact.
pub async fn index(Extension(auth): Extension<AuthContext>) -> Redirect {
    if is_manager(&auth.principal) {
        Redirect::to(DASHBOARD_PATH)
    } else {
        Redirect::to(PLAN_FACT_PATH)
    }
}

/// `GET /api/dashboard?year&month`
pub async fn home(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    if !is_manager(&auth.principal) {
        return Ok(Redirect::to(PLAN_FACT_PATH).into_response());
    }

    let today = ctx.today();
    let (year, month) = normalize_period(&QueryParams::from(pairs), today);

    let conn = ctx.core.open_db()?;
    let queries = ctx.core.queries()?;
    let charts =
        get_top_performers_and_category_stats(&SqliteAggregations::new(&conn, &queries), year, month);

    let own_name = match auth.principal.external_id {
        Some(manid) => repository::doctor_name(&conn, manid).unwrap_or_else(|e| {
            tracing::warn!(manid, error = %e, "Doctor name lookup failed");
            None
        }),
        None => None,
    };
    let current_user = CurrentUser::new(&auth.principal, own_name.as_deref());

    Ok(Json(assemble_dashboard(current_user, year, month, charts, today)).into_response())
}
