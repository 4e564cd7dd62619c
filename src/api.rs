// src/api.rs
//
// HTTP surface. The upstream session/auth middleware is out of scope; the
// `AuthSession` extractor stands in for it by reading the organization and
// role the session layer resolves (`x-organization-id` / `x-role` headers).
// Error variants map onto the HTTP taxonomy; unexpected errors are logged
// with context and surfaced as a generic 500.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::kpi::{KpiService, TrendGranularity};
use crate::periods::{
    CreatePeriodRequest, EntryPatch, GenerateFilteredRequest, PayrollError, PayrollService,
};

pub const SUPERADMIN_ROLE: &str = "SUPERADMIN";

#[derive(Clone)]
pub struct AppState {
    pub payroll: Arc<PayrollService>,
    pub kpi: Arc<KpiService>,
}

/// Session identity resolved by the (out-of-scope) auth middleware.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub organization_id: String,
    pub role: String,
}

impl AuthSession {
    fn require_superadmin(&self) -> Result<(), PayrollError> {
        if self.role == SUPERADMIN_ROLE {
            Ok(())
        } else {
            Err(PayrollError::Forbidden(
                "Superadmin role required".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let organization_id = parts
            .headers
            .get("x-organization-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let role = parts
            .headers
            .get("x-role")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("USER")
            .to_string();
        match organization_id {
            Some(organization_id) => Ok(AuthSession {
                organization_id,
                role,
            }),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
                .into_response()),
        }
    }
}

impl IntoResponse for PayrollError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            PayrollError::Validation(msg)
            | PayrollError::InvalidState(msg)
            | PayrollError::EmptyResult(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            PayrollError::Conflict {
                message,
                existing_period,
            } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "existingPeriod": existing_period }),
            ),
            PayrollError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            PayrollError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            PayrollError::Internal(err) => {
                error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// --- Query DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperadminQuery {
    pub organization_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub granularity: Option<String>,
}

impl WindowQuery {
    fn window(&self) -> Result<(NaiveDate, NaiveDate), PayrollError> {
        let from = self
            .start_date
            .ok_or_else(|| PayrollError::Validation("Query param 'startDate' is required".into()))?;
        let to = self
            .end_date
            .ok_or_else(|| PayrollError::Validation("Query param 'endDate' is required".into()))?;
        Ok((from, to))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

// --- Router ---

pub fn router(state: AppState) -> Router {
    let payroll_routes = Router::new()
        .route("/", get(list_periods).post(create_period))
        .route("/generate-filtered", post(generate_filtered))
        .route("/superadmin/all", get(superadmin_all))
        .route("/superadmin/stats", get(superadmin_stats))
        .route("/{id}", get(get_period).delete(delete_period))
        .route("/{id}/generate-entries", post(generate_entries))
        .route("/{id}/status", patch(patch_status))
        .route("/{period_id}/entries/{entry_id}", patch(patch_entry));

    let kpi_routes = Router::new()
        .route("/departments", get(kpi_departments))
        .route("/shifts", get(kpi_shifts))
        .route("/datetime", get(kpi_datetime))
        .route("/routes", get(kpi_routes_handler))
        .route("/vehicle-categories", get(kpi_vehicle_categories))
        .route("/locations", get(kpi_locations))
        .route("/dashboard", get(kpi_dashboard))
        .route("/trends", get(kpi_trends))
        .route("/comparison", get(kpi_comparison));

    Router::new()
        .nest("/api/payroll-periods", payroll_routes)
        .nest("/api/kpi", kpi_routes)
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "fleetpay-core" }))
}

// --- Payroll handlers ---

async fn list_periods(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<ListQuery>,
) -> Result<Response, PayrollError> {
    let page = state.payroll.list_periods(
        &session.organization_id,
        query.status.as_deref(),
        query.page,
        query.limit,
    )?;
    Ok(Json(page).into_response())
}

async fn get_period(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<String>,
) -> Result<Response, PayrollError> {
    let detail = state
        .payroll
        .get_period_detail(&session.organization_id, &id)?;
    Ok(Json(detail).into_response())
}

async fn create_period(
    State(state): State<AppState>,
    session: AuthSession,
    Json(body): Json<CreatePeriodRequest>,
) -> Result<Response, PayrollError> {
    let period = state
        .payroll
        .create_period(&session.organization_id, body)?;
    Ok((StatusCode::CREATED, Json(period)).into_response())
}

async fn generate_entries(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<String>,
) -> Result<Response, PayrollError> {
    let generated = state
        .payroll
        .generate_entries(&session.organization_id, &id)?;
    Ok((StatusCode::CREATED, Json(generated)).into_response())
}

async fn generate_filtered(
    State(state): State<AppState>,
    session: AuthSession,
    Json(body): Json<GenerateFilteredRequest>,
) -> Result<Response, PayrollError> {
    let generated = state
        .payroll
        .generate_filtered(&session.organization_id, body)?;
    Ok((StatusCode::CREATED, Json(generated)).into_response())
}

async fn patch_status(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Response, PayrollError> {
    let status = body
        .status
        .ok_or_else(|| PayrollError::Validation("Field 'status' is required".into()))?;
    let detail = state
        .payroll
        .patch_status(&session.organization_id, &id, &status)?;
    Ok(Json(detail).into_response())
}

async fn patch_entry(
    State(state): State<AppState>,
    session: AuthSession,
    Path((period_id, entry_id)): Path<(String, String)>,
    Json(body): Json<EntryPatch>,
) -> Result<Response, PayrollError> {
    let entry = state.payroll.patch_entry(
        &session.organization_id,
        &period_id,
        &entry_id,
        body,
    )?;
    Ok(Json(entry).into_response())
}

async fn delete_period(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<String>,
) -> Result<Response, PayrollError> {
    state
        .payroll
        .delete_period(&session.organization_id, &id)?;
    Ok(Json(json!({ "message": "Payroll period deleted" })).into_response())
}

async fn superadmin_all(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<SuperadminQuery>,
) -> Result<Response, PayrollError> {
    session.require_superadmin()?;
    let page = state.payroll.superadmin_list(
        query.organization_id.as_deref(),
        query.status.as_deref(),
        query.page,
        query.limit,
    )?;
    Ok(Json(page).into_response())
}

async fn superadmin_stats(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<SuperadminQuery>,
) -> Result<Response, PayrollError> {
    session.require_superadmin()?;
    let stats = state.payroll.superadmin_stats(
        query.organization_id.as_deref(),
        query.start_date,
        query.end_date,
    )?;
    Ok(Json(stats).into_response())
}

// --- KPI handlers ---

async fn kpi_departments(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state
        .kpi
        .department_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_shifts(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state.kpi.shift_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_datetime(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state
        .kpi
        .datetime_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_routes_handler(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state.kpi.route_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_vehicle_categories(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state
        .kpi
        .vehicle_category_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_locations(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let rows = state
        .kpi
        .location_kpis(&session.organization_id, from, to)?;
    Ok(Json(rows).into_response())
}

async fn kpi_dashboard(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let dashboard = state.kpi.dashboard(&session.organization_id, from, to)?;
    Ok(Json(dashboard).into_response())
}

async fn kpi_trends(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let granularity = TrendGranularity::parse(query.granularity.as_deref().unwrap_or("daily"))?;
    let points = state
        .kpi
        .trends(&session.organization_id, from, to, granularity)?;
    Ok(Json(points).into_response())
}

async fn kpi_comparison(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WindowQuery>,
) -> Result<Response, PayrollError> {
    let (from, to) = query.window()?;
    let comparison = state
        .kpi
        .period_comparison(&session.organization_id, from, to)?;
    Ok(Json(comparison).into_response())
}
