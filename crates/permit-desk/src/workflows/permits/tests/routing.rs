use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::permits::repository::PermitRepository;
use crate::workflows::permits::router::{permit_router, ACTOR_HEADER};

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(ACTOR_HEADER, "carla")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn pdf_json(name: &str) -> Value {
    json!({ "fileName": name, "content": [37, 80, 68, 70] })
}

#[tokio::test]
async fn create_then_finalize_over_http() {
    let harness = harness();
    let app = permit_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/permits",
            json!({
                "clientId": "cli-1",
                "type": "Alvará de Funcionamento",
                "requestDate": "2025-04-01",
                "note": "Protocolo aberto na prefeitura"
            }),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    assert_eq!(created["processingStatus"], json!("lançado"));
    assert_eq!(created["lifecycle"]["state"], json!("opening"));
    assert_eq!(created["status"], json!("pending"));
    assert_eq!(created["notes"][0]["author"], json!("carla"));
    let id = created["id"].as_str().expect("id").to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/permits/{id}/finalize"),
            json!({}),
        ))
        .await
        .expect("finalize");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["requirements"], json!(["expiration_date", "document"]));
    assert!(body["error"]
        .as_str()
        .expect("message")
        .contains("document required"));

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/permits/{id}/finalize"),
            json!({
                "expirationDate": "2025-06-01",
                "documents": [pdf_json("alvara.pdf")]
            }),
        ))
        .await
        .expect("finalize");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["permit"]["issueDate"], json!("2025-05-20"));
    assert_eq!(body["permit"]["status"], json!("expiring"));
    assert_eq!(body["uploaded"][0]["fileName"], json!("alvara.pdf"));
}

#[tokio::test]
async fn partial_upload_returns_multi_status() {
    let harness = harness_with(Arc::new(MemoryDocumentStore::failing_on(&["b.pdf"])));
    harness
        .repository
        .insert(active_permit("alv-1"))
        .expect("seeded");
    let app = permit_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/permits/alv-1/documents",
            json!({ "documents": [pdf_json("a.pdf"), pdf_json("b.pdf")] }),
        ))
        .await
        .expect("attach");

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body = read_json_body(response).await;
    assert_eq!(body["failedUploads"][0]["fileName"], json!("b.pdf"));
    assert_eq!(body["permit"]["notes"][0]["attachments"], json!(["a.pdf"]));
}

#[tokio::test]
async fn unknown_permit_is_not_found() {
    let harness = harness();
    let app = permit_router(harness.service.clone());

    let response = app
        .oneshot(empty_request("GET", "/api/v1/permits/alv-404"))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_without_confirmation_is_rejected() {
    let harness = harness();
    harness.repository.insert(permit("alv-1")).expect("seeded");
    let app = permit_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/permits/alv-1"))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(empty_request("DELETE", "/api/v1/permits/alv-1?confirm=true"))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(harness.repository.list().expect("list").is_empty());
}

#[tokio::test]
async fn renewal_routes_walk_the_cycle() {
    let harness = harness();
    harness
        .repository
        .insert(active_permit("alv-1"))
        .expect("seeded");
    let app = permit_router(harness.service.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/permits/alv-1/renewal",
            json!({ "note": "Cliente pediu renovação" }),
        ))
        .await
        .expect("enter renewal");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["permit"]["lifecycle"]["state"], json!("renewing"));
    assert_eq!(body["permit"]["badges"][0]["kind"], json!("in_renewal"));

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/v1/permits/alv-1",
            json!({ "clientId": "cli-2" }),
        ))
        .await
        .expect("edit");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/permits/alv-1/renewal/finalize",
            json!({
                "expirationDate": "2026-05-20",
                "staged": [pdf_json("alvara-2026.pdf")]
            }),
        ))
        .await
        .expect("finalize renewal");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["permit"]["lifecycle"]["state"], json!("active"));
    assert_eq!(body["permit"]["status"], json!("valid"));
}

#[tokio::test]
async fn fee_routes_upsert_single_year_record() {
    let harness = harness();
    harness
        .repository
        .insert(active_permit("alv-1"))
        .expect("seeded");
    let app = permit_router(harness.service.clone());

    for body in [json!({ "feePaid": true }), json!({ "feeSent": true })] {
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/v1/permits/alv-1/fees/2025", body))
            .await
            .expect("upsert");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(empty_request("GET", "/api/v1/permits/alv-1/fees/2025"))
        .await
        .expect("fee");
    let body = read_json_body(response).await;
    assert_eq!(
        body,
        json!({
            "year": 2025,
            "feeSent": true,
            "feeSentDate": null,
            "feePaid": true,
            "feePaidDate": null
        })
    );
}

#[tokio::test]
async fn report_route_summarises_buckets() {
    let harness = harness();
    harness.repository.insert(permit("alv-1")).expect("seeded");
    harness
        .repository
        .insert(active_permit("alv-2"))
        .expect("seeded");
    let app = permit_router(harness.service.clone());

    let response = app
        .oneshot(empty_request("GET", "/api/v1/permits/report"))
        .await
        .expect("report");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total"], json!(2));
    assert_eq!(body["counts"]["opening"], json!(1));
    assert_eq!(body["counts"]["valid"], json!(1));
}

#[tokio::test]
async fn extract_rejects_images() {
    let harness = harness();
    let app = permit_router(harness.service.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/permits/extract",
            json!({ "fileName": "foto.png", "content": [1, 2] }),
        ))
        .await
        .expect("extract");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
