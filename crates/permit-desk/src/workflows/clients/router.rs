use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ClientId, ClientProfile};
use super::fees::FeeFlag;
use super::repository::{ClientRepository, FeeRecordRepository, RepositoryError};
use super::service::{ClientService, ClientServiceError};

/// Router exposing client registration and yearly fee tracking.
pub fn client_router<R, F>(service: Arc<ClientService<R, F>>) -> Router
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/clients",
            post(create_handler::<R, F>).get(list_handler::<R, F>),
        )
        .route(
            "/api/v1/clients/:client_id",
            get(get_handler::<R, F>)
                .put(update_handler::<R, F>)
                .delete(delete_handler::<R, F>),
        )
        .route(
            "/api/v1/clients/:client_id/fees/:year",
            get(fee_handler::<R, F>),
        )
        .route(
            "/api/v1/clients/:client_id/fees/:year/toggle",
            post(toggle_handler::<R, F>),
        )
        .route(
            "/api/v1/clients/:client_id/fees/:year/protocol",
            put(protocol_handler::<R, F>),
        )
        .with_state(service)
}

type ServiceState<R, F> = State<Arc<ClientService<R, F>>>;

pub(crate) fn error_response(error: ClientServiceError) -> Response {
    let status = match &error {
        ClientServiceError::Validation(_) | ClientServiceError::Import(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ClientServiceError::NotFound(_)
        | ClientServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ClientServiceError::DuplicateTaxId(_)
        | ClientServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ClientServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler<R, F>(
    State(service): ServiceState<R, F>,
    axum::Json(profile): axum::Json<ClientProfile>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.create(profile) {
        Ok(client) => (StatusCode::CREATED, axum::Json(client)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<R, F>(State(service): ServiceState<R, F>) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.list() {
        Ok(clients) => (StatusCode::OK, axum::Json(clients)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.get(&ClientId(client_id)) {
        Ok(client) => (StatusCode::OK, axum::Json(client)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path(client_id): Path<String>,
    axum::Json(profile): axum::Json<ClientProfile>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.update(&ClientId(client_id), profile) {
        Ok(client) => (StatusCode::OK, axum::Json(client)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.delete(&ClientId(client_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn fee_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path((client_id, year)): Path<(String, i32)>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.fee(&ClientId(client_id), year) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToggleRequest {
    flag: FeeFlag,
}

pub(crate) async fn toggle_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path((client_id, year)): Path<(String, i32)>,
    axum::Json(request): axum::Json<ToggleRequest>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.toggle_fee(&ClientId(client_id), year, request.flag) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProtocolRequest {
    #[serde(rename = "protocolo")]
    protocol: String,
}

pub(crate) async fn protocol_handler<R, F>(
    State(service): ServiceState<R, F>,
    Path((client_id, year)): Path<(String, i32)>,
    axum::Json(request): axum::Json<ProtocolRequest>,
) -> Response
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    match service.set_protocol(&ClientId(client_id), year, &request.protocol) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}
