use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{PermitId, StagedDocument};
use super::extraction::{ExtractionConfirmation, ExtractionError};
use super::fees::FeePatch;
use super::repository::{DocumentId, DocumentStoreError, PermitRepository, RepositoryError};
use super::service::{PermitFilter, PermitService, PermitServiceError, TransitionOutcome};
use super::transitions::{FinalizeInput, NewPermit, PermitEdit, RenewalForm, WorkflowError};
use crate::workflows::clients::repository::ClientRepository;

/// Header carrying the acting user's name, set by the auth layer in front of the API.
pub const ACTOR_HEADER: &str = "x-actor";
const DEFAULT_ACTOR: &str = "sistema";

/// Router exposing the permit workflow over HTTP.
pub fn permit_router<R, C>(service: Arc<PermitService<R, C>>) -> Router
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/permits",
            post(create_handler::<R, C>).get(list_handler::<R, C>),
        )
        .route("/api/v1/permits/report", get(report_handler::<R, C>))
        .route("/api/v1/permits/extract", post(extract_handler::<R, C>))
        .route("/api/v1/permits/import", post(import_handler::<R, C>))
        .route(
            "/api/v1/permits/:permit_id",
            get(get_handler::<R, C>)
                .patch(edit_handler::<R, C>)
                .delete(delete_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/finalize",
            post(finalize_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/renewal",
            post(enter_renewal_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/renewal/update",
            post(update_renewal_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/renewal/finalize",
            post(finalize_renewal_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/documents",
            post(attach_handler::<R, C>).get(documents_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/notes/attachments",
            post(attachment_note_handler::<R, C>),
        )
        .route(
            "/api/v1/permits/:permit_id/fees/:year",
            put(upsert_fee_handler::<R, C>).get(fee_handler::<R, C>),
        )
        .route(
            "/api/v1/documents/:document_id/link",
            get(download_link_handler::<R, C>),
        )
        .with_state(service)
}

type ServiceState<R, C> = State<Arc<PermitService<R, C>>>;

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

pub(crate) fn error_response(error: PermitServiceError) -> Response {
    let status = match &error {
        PermitServiceError::Workflow(_)
        | PermitServiceError::UnknownClient(_)
        | PermitServiceError::TypeNotAllowed { .. }
        | PermitServiceError::Extraction(ExtractionError::NotPdf(_))
        | PermitServiceError::Extraction(ExtractionError::Unconfirmed) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PermitServiceError::NotFound(_)
        | PermitServiceError::Repository(RepositoryError::NotFound)
        | PermitServiceError::Documents(DocumentStoreError::NotFound) => StatusCode::NOT_FOUND,
        PermitServiceError::SubmissionInFlight(_)
        | PermitServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        PermitServiceError::Documents(_) | PermitServiceError::Extraction(_) => {
            StatusCode::BAD_GATEWAY
        }
        PermitServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = match &error {
        PermitServiceError::Workflow(WorkflowError::MissingRequirements(requirements)) => json!({
            "error": error.to_string(),
            "requirements": requirements,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };

    (status, axum::Json(payload)).into_response()
}

fn outcome_response(outcome: TransitionOutcome) -> Response {
    let status = if outcome.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, axum::Json(outcome)).into_response()
}

pub(crate) async fn create_handler<R, C>(
    State(service): ServiceState<R, C>,
    headers: HeaderMap,
    axum::Json(input): axum::Json<NewPermit>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.create(input, &actor(&headers)) {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<R, C>(
    State(service): ServiceState<R, C>,
    Query(filter): Query<PermitFilter>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.list(&filter) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn report_handler<R, C>(State(service): ServiceState<R, C>) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.report() {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.get(&PermitId(permit_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn edit_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(changes): axum::Json<PermitEdit>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.edit(&PermitId(permit_id), changes, &actor(&headers)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DeleteParams {
    #[serde(default)]
    confirm: bool,
}

pub(crate) async fn delete_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.delete(&PermitId(permit_id), params.confirm) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn finalize_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(input): axum::Json<FinalizeInput>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.finalize(&PermitId(permit_id), input, &actor(&headers)) {
        Ok(outcome) => outcome_response(outcome),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RenewalRequest {
    #[serde(default)]
    note: Option<String>,
}

pub(crate) async fn enter_renewal_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<RenewalRequest>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.enter_renewal(
        &PermitId(permit_id),
        request.note.as_deref(),
        &actor(&headers),
    ) {
        Ok(outcome) => outcome_response(outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_renewal_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(mut form): axum::Json<RenewalForm>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.update_renewal(&PermitId(permit_id), &mut form, &actor(&headers)) {
        Ok(outcome) => outcome_response(outcome),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn finalize_renewal_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(mut form): axum::Json<RenewalForm>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.finalize_renewal(&PermitId(permit_id), &mut form, &actor(&headers)) {
        Ok(outcome) => outcome_response(outcome),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachRequest {
    documents: Vec<StagedDocument>,
}

pub(crate) async fn attach_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<AttachRequest>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.attach_documents(&PermitId(permit_id), request.documents, &actor(&headers)) {
        Ok(outcome) => outcome_response(outcome),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachmentNoteRequest {
    files: Vec<String>,
}

pub(crate) async fn attachment_note_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<AttachmentNoteRequest>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.record_attachment_note(&PermitId(permit_id), &request.files, &actor(&headers)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn documents_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(permit_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.documents(&PermitId(permit_id)) {
        Ok(documents) => (StatusCode::OK, axum::Json(documents)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn fee_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path((permit_id, year)): Path<(String, i32)>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.fee(&PermitId(permit_id), year) {
        Ok(fee) => (StatusCode::OK, axum::Json(fee)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn upsert_fee_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path((permit_id, year)): Path<(String, i32)>,
    axum::Json(patch): axum::Json<FeePatch>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.upsert_fee(&PermitId(permit_id), year, &patch) {
        Ok(fee) => (StatusCode::OK, axum::Json(fee)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn download_link_handler<R, C>(
    State(service): ServiceState<R, C>,
    Path(document_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.download_link(&DocumentId(document_id)) {
        Ok(link) => (StatusCode::OK, axum::Json(link)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn extract_handler<R, C>(
    State(service): ServiceState<R, C>,
    axum::Json(document): axum::Json<StagedDocument>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.extract(&document) {
        Ok(draft) => (StatusCode::OK, axum::Json(draft)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportRequest {
    confirmation: ExtractionConfirmation,
    document: StagedDocument,
}

pub(crate) async fn import_handler<R, C>(
    State(service): ServiceState<R, C>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ImportRequest>,
) -> Response
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    match service.import_extracted(request.confirmation, request.document, &actor(&headers)) {
        Ok(outcome) => {
            let status = if outcome.is_complete() {
                StatusCode::CREATED
            } else {
                StatusCode::MULTI_STATUS
            };
            (status, axum::Json(outcome)).into_response()
        }
        Err(error) => error_response(error),
    }
}
