//! Plan administration endpoints (staff only).
//!
//! `GET    /api/admin/plans`: list with names and monthly plan
//! `POST   /api/admin/plans`: create
//! `PUT    /api/admin/plans/:id`: change plan value
//! `DELETE /api/admin/plans/:id`: delete
//! `POST   /api/admin/plans/export`: CSV of selected plans
//! `GET    /api/admin/plans/export-all`: CSV of every plan
//! `POST   /api/admin/plans/import`: CSV upsert
//! `GET|POST /api/admin/plans/bulk-delete`: options / delete by year

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::db::repository::{NewPlan, PlanFilter};
use crate::plans::{self, BulkDeleteOptions, BulkDeleteRequest, ImportSummary, PlanView};

fn require_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.principal.is_staff() {
        Ok(())
    } else {
        tracing::warn!(login = %auth.principal.login, "Plan administration denied");
        Err(ApiError::Forbidden)
    }
}

fn csv_response(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct PlanListQuery {
    pub year: Option<String>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct PlanListResponse {
    pub plans: Vec<PlanView>,
    pub total: usize,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PlanListQuery>,
) -> Result<Json<PlanListResponse>, ApiError> {
    require_staff(&auth)?;
    let filter = PlanFilter {
        year: query.year.as_deref().and_then(|y| y.trim().parse().ok()),
        search: query.search,
    };
    let conn = ctx.core.open_db()?;
    let plans = plans::list_plan_views(&conn, &filter)?;
    Ok(Json(PlanListResponse {
        total: plans.len(),
        plans,
    }))
}

#[derive(Deserialize)]
pub struct CreatePlanRequest {
    pub year: i32,
    pub specid: i64,
    pub plan_vistype: i64,
    pub plan_value: i64,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanView>), ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    let view = plans::create_plan(
        &conn,
        &NewPlan {
            year: request.year,
            specid: request.specid,
            plan_vistype: request.plan_vistype,
            plan_value: request.plan_value,
        },
    )?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Deserialize)]
pub struct UpdatePlanRequest {
    pub plan_value: i64,
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePlanRequest>,
) -> Result<Json<PlanView>, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(plans::update_plan(&conn, id, request.plan_value)?))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    plans::remove_plan(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub ids: Vec<i64>,
}

pub async fn export_selected(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    let body = plans::export_selected_csv(&conn, &request.ids)?;
    Ok(csv_response("plans_export.csv", body))
}

pub async fn export_all(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    let body = plans::export_all_csv(&conn)?;
    Ok(csv_response("all_plans.csv", body))
}

pub async fn import(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<ImportSummary>, ApiError> {
    require_staff(&auth)?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Select a CSV file".into()));
    }
    let conn = ctx.core.open_db()?;
    Ok(Json(plans::import_csv(&conn, &body)?))
}

pub async fn bulk_delete_options(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<BulkDeleteOptions>, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(plans::bulk_delete_options(&conn)?))
}

#[derive(Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: usize,
}

pub async fn bulk_delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    require_staff(&auth)?;
    let conn = ctx.core.open_db()?;
    let deleted = plans::bulk_delete(&conn, request)?;
    Ok(Json(BulkDeleteResponse { deleted }))
}
