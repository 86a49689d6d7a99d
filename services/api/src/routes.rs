use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use permit_desk::error::AppError;
use permit_desk::workflows::clients::{
    client_router, ClientRepository, ClientRosterImporter, ClientService, FeeRecordRepository,
    SkippedRow,
};
use permit_desk::workflows::permits::{permit_router, PermitRepository, PermitService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct RosterPreviewRequest {
    pub(crate) csv: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RosterPreviewRow {
    pub(crate) line: usize,
    pub(crate) tax_id: String,
    pub(crate) legal_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RosterPreviewResponse {
    pub(crate) accepted: Vec<RosterPreviewRow>,
    pub(crate) skipped: Vec<SkippedRow>,
}

pub(crate) fn with_service_routes<R, C, F>(
    permits: Arc<PermitService<R, C>>,
    clients: Arc<ClientService<C, F>>,
) -> axum::Router
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    permit_router(permits)
        .merge(client_router(clients))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/clients/roster/preview",
            axum::routing::post(roster_preview_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Validates a roster CSV without registering anyone.
pub(crate) async fn roster_preview_endpoint(
    Json(payload): Json<RosterPreviewRequest>,
) -> Result<Json<RosterPreviewResponse>, AppError> {
    let reader = Cursor::new(payload.csv.into_bytes());
    let parse = ClientRosterImporter::from_reader(reader)?;

    let accepted = parse
        .profiles
        .into_iter()
        .map(|(line, profile)| RosterPreviewRow {
            line,
            tax_id: profile.tax_id.formatted(),
            legal_name: profile.legal_name,
        })
        .collect();

    Ok(Json(RosterPreviewResponse {
        accepted,
        skipped: parse.skipped,
    }))
}
