//! Dashboard API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Dashboard routes are nested under `/api/`, the setup wizard under `/setup/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Setup gate → 2. Auth validator → 3. Audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the dashboard router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn dashboard_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build router from a pre-constructed `ApiContext` (fixed "today" in tests).
#[cfg(test)]
pub(crate) fn dashboard_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension → Setup gate → Auth → Audit → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/", get(endpoints::dashboard::index))
        .route("/dashboard", get(endpoints::dashboard::home))
        .route("/dashboard/plan-fact", get(endpoints::plan_fact::comparison))
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/admin/plans",
            get(endpoints::plans::list).post(endpoints::plans::create),
        )
        .route(
            "/admin/plans/:id",
            put(endpoints::plans::update).delete(endpoints::plans::delete),
        )
        .route("/admin/plans/export", post(endpoints::plans::export_selected))
        .route("/admin/plans/export-all", get(endpoints::plans::export_all))
        .route("/admin/plans/import", post(endpoints::plans::import))
        .route(
            "/admin/plans/bulk-delete",
            get(endpoints::plans::bulk_delete_options).post(endpoints::plans::bulk_delete),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::configured::require_configured))
        .layer(axum::Extension(ctx.clone()));

    // Nested "/" only answers the bare prefix; the landing page also takes the slash form
    let landing = Router::new()
        .route("/api/", get(endpoints::dashboard::index))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::configured::require_configured))
        .layer(axum::Extension(ctx.clone()));

    // Login: gated on setup, no auth
    let login = Router::new()
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::configured::require_configured))
        .layer(axum::Extension(ctx.clone()));

    let open = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx.clone());

    let setup = Router::new()
        .route("/status", get(endpoints::setup::status))
        .route("/test", post(endpoints::setup::test))
        .route("/configure", post(endpoints::setup::configure))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::audit::log_access));

    Router::new()
        .nest("/api", protected)
        .nest("/api", login)
        .nest("/api", open)
        .merge(landing)
        .nest("/setup", setup)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
}
