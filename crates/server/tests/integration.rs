//! Integration tests for the patient search server.
//!
//! The local FHIR store and the external search source are wiremock servers;
//! requests go through the full Axum router, middleware included.

mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use http_body_util::BodyExt;
use patientsearch_core::Method;
use patientsearch_server::config::Config;
use patientsearch_server::state::AppState;
use patientsearch_server::sync::AuditEvent;
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    RecordingAudit, clinician_token, jane_doe, jwt, searchset, site_extension, stored_jane_doe,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct TestApp {
    app: Router,
    audit: Arc<RecordingAudit>,
}

/// Build the app against a mock store and, optionally, a mock external source
fn test_app(store: &MockServer, external: Option<&MockServer>) -> TestApp {
    let config = Config {
        bind_address: "0.0.0.0:0".to_string(),
        map_api: format!("{}/fhir", store.uri()),
        external_fhir_api: external.map(|server| format!("{}/fhir", server.uri())),
        new_patient_extensions: vec![site_extension()],
        version_string: Some("1.2.3".to_string()),
        ..Config::default()
    };
    let audit = Arc::new(RecordingAudit::default());
    let state = AppState::new(config)
        .expect("Failed to build state")
        .with_audit(audit.clone());

    TestApp {
        app: patientsearch_server::build_app(state),
        audit,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    send("GET", uri, token, None)
}

fn send(verb: &str, uri: &str, token: Option<&str>, body: Option<JsonValue>) -> Request<Body> {
    let mut builder = Request::builder().method(verb).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/fhir+json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request to the app and return (status, body as JSON).
async fn request(app: &Router, req: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();

    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, body)
}

/// Send a request to the app and return the body as text
async fn request_text(app: &Router, req: Request<Body>) -> String {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Public routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_probes_the_store() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/metadata"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"resourceType": "CapabilityStatement"})),
        )
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, body) = request(&test.app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "1.2.3");
}

#[tokio::test]
async fn health_reports_a_failing_store() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/metadata"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, body) = request(&test.app, get("/health", None)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn settings_hide_secret_keys() {
    let store = MockServer::start().await;
    let test = test_app(&store, None);

    let (status, body) = request(&test.app, get("/settings", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["MAP_API"], format!("{}/fhir", store.uri()));
    assert_eq!(body["NEW_PATIENT_EXTENSIONS"], json!([site_extension()]));

    let (status, body) = request(&test.app, get("/settings/version_string", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"VERSION_STRING": "1.2.3"}));

    let (status, body) = request(&test.app, get("/settings/secret_key", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["resourceType"], "OperationOutcome");
}

#[tokio::test]
async fn validate_token_reports_status() {
    let store = MockServer::start().await;
    let test = test_app(&store, None);

    let (status, body) = request(&test.app, get("/validate_token", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": false, "expires_in": 0.0}));

    let (_, body) = request(&test.app, get("/validate_token", Some(&clinician_token()))).await;
    assert_eq!(body["valid"], true);
    assert!(body["expires_in"].as_f64().unwrap() > 3000.0);
}

#[tokio::test]
async fn metrics_are_exposed() {
    let store = MockServer::start().await;
    let test = test_app(&store, None);

    let (status, _) = request(&test.app, get("/settings", None)).await;
    assert_eq!(status, StatusCode::OK);

    let metrics = request_text(&test.app, get("/metrics", None)).await;
    assert!(metrics.contains("http_requests_total"), "{metrics}");
    assert!(metrics.contains(r#"path="/settings""#), "{metrics}");
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_require_a_token() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    for uri in ["/user_info", "/fhir/Patient", "/external_search/Patient"] {
        let (status, body) = request(&test.app, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["issue"][0]["code"], "login");
    }

    let expired = jwt(json!({"sub": "x", "exp": chrono::Utc::now().timestamp() - 60}));
    let (status, _) = request(&test.app, get("/user_info", Some(&expired))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_info_comes_from_claims() {
    let store = MockServer::start().await;
    let test = test_app(&store, None);

    let (status, body) = request(&test.app, get("/user_info", Some(&clinician_token()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"name": "Fake Clinician", "email": "fake@testy.org"})
    );
}

// ---------------------------------------------------------------------------
// Store pass-through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_defaults_to_a_large_page() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/CarePlan"))
        .and(query_param("_count", "1000"))
        .and(query_param("subject", "Patient/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(0, vec![])))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, body) = request(
        &test.app,
        get("/fhir/CarePlan?subject=Patient/8", Some(&clinician_token())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resourceType"], "Bundle");
}

#[tokio::test]
async fn store_errors_keep_their_status() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/500"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&store)
        .await;
    let test = test_app(&store, None);
    let token = clinician_token();

    let (status, body) = request(&test.app, get("/fhir/Patient/404", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["resourceType"], "OperationOutcome");

    let (status, _) = request(&test.app, get("/fhir/Patient/500", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn created_patients_get_default_extensions_and_are_audited() {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fhir/Patient"))
        .and(body_partial_json(json!({"extension": [site_extension()]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_jane_doe("5")))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, body) = request(
        &test.app,
        send("POST", "/fhir/Patient", Some(&clinician_token()), Some(jane_doe())),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "5");
    assert!(matches!(
        &test.audit.events()[..],
        [AuditEvent::ResourceChanged { method: Method::Post, resource_id: Some(id), user: Some(user), .. }]
            if id == "5" && user == "fake@testy.org"
    ));
}

#[tokio::test]
async fn mismatched_resource_type_is_rejected() {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, _) = request(
        &test.app,
        send(
            "POST",
            "/fhir/Observation",
            Some(&clinician_token()),
            Some(jane_doe()),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_is_forwarded_and_audited() {
    let store = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/fhir/Patient/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, _) = request(
        &test.app,
        send("DELETE", "/fhir/Patient/7", Some(&clinician_token()), None),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(test.audit.events().len(), 1);
}

#[tokio::test]
async fn restore_reactivates_a_deleted_patient() {
    let store = MockServer::start().await;
    let mut deleted = stored_jane_doe("7");
    deleted["active"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(deleted))
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("PUT"))
        .and(path("/fhir/Patient/7"))
        .and(body_partial_json(json!({"active": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_jane_doe("7")))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, None);

    let (status, body) = request(
        &test.app,
        send("PUT", "/fhir/Patient/7/$restore", Some(&clinician_token()), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
}

// ---------------------------------------------------------------------------
// External search
// ---------------------------------------------------------------------------

/// External source answering a Jane Doe search for the test clinician
async fn mount_external_jane_doe(external: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .and(query_param("DEA", "AB1234563"))
        .and(query_param("family", "Doe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(1, vec![jane_doe()])))
        .expect(1)
        .mount(external)
        .await;
}

#[tokio::test]
async fn external_match_is_created_locally_and_tagged() {
    let store = MockServer::start().await;
    let external = MockServer::start().await;
    mount_external_jane_doe(&external).await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .and(query_param("birthdate", "eq1980-01-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(0, vec![])))
        .expect(1)
        .mount(&store)
        .await;
    let found = json!({"system": "urn:patientsearch:external-source", "value": "found"});
    Mock::given(method("POST"))
        .and(path("/fhir/Patient"))
        .and(body_partial_json(json!({
            "active": true,
            "identifier": [
                {"system": "http://example.org/mrn", "value": "123"},
                found.clone()
            ],
            "extension": [site_extension()]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_jane_doe("1")))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, Some(&external));

    let (status, body) = request(
        &test.app,
        get("/external_search/Patient?family=Doe", Some(&clinician_token())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resourceType"], "Bundle");
    assert_eq!(body["entry"][0]["resource"]["id"], "1");
    assert_eq!(body["entry"][0]["resource"]["identifier"][1], found);

    let metrics = request_text(&test.app, get("/metrics", None)).await;
    assert!(metrics.contains("patient_sync_total"), "{metrics}");
    assert!(metrics.contains(r#"outcome="created""#), "{metrics}");
}

#[tokio::test]
async fn put_external_search_reactivates_inactive_match() {
    let store = MockServer::start().await;
    let external = MockServer::start().await;
    mount_external_jane_doe(&external).await;

    let mut inactive = stored_jane_doe("7");
    inactive["identifier"] = json!([
        {"system": "http://example.org/mrn", "value": "123"},
        {"system": "urn:patientsearch:external-source", "value": "found"}
    ]);
    inactive["active"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(1, vec![inactive])))
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("PUT"))
        .and(path("/fhir/Patient/7"))
        .and(body_partial_json(json!({"active": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_jane_doe("7")))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, Some(&external));

    let (status, body) = request(
        &test.app,
        send(
            "PUT",
            "/external_search/Patient?family=Doe",
            Some(&clinician_token()),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"][0]["resource"]["id"], "7");
}

#[tokio::test]
async fn external_patient_id_is_not_overwritten() {
    let store = MockServer::start().await;
    let external = MockServer::start().await;
    let mut with_id = jane_doe();
    with_id["id"] = json!("ext-42");
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(1, vec![with_id])))
        .expect(1)
        .mount(&external)
        .await;
    let mut stored = stored_jane_doe("7");
    stored["identifier"] = json!([
        {"system": "http://example.org/mrn", "value": "123"},
        {"system": "urn:patientsearch:external-source", "value": "found"}
    ]);
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(1, vec![stored])))
        .expect(1)
        .mount(&store)
        .await;
    let test = test_app(&store, Some(&external));

    let (status, body) = request(
        &test.app,
        get("/external_search/Patient?family=Doe", Some(&clinician_token())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"][0]["resource"]["id"], "ext-42");
}

#[tokio::test]
async fn external_search_without_match_returns_empty_bundle() {
    let store = MockServer::start().await;
    let external = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(searchset(0, vec![])))
        .expect(1)
        .mount(&external)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;
    let test = test_app(&store, Some(&external));

    let (status, body) = request(
        &test.app,
        get("/external_search/Patient?family=Nobody", Some(&clinician_token())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn external_search_needs_the_identity_claim() {
    let store = MockServer::start().await;
    let external = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&external)
        .await;
    let test = test_app(&store, Some(&external));

    let no_dea = jwt(json!({"sub": "x", "email": "nurse@testy.org"}));
    let (status, body) = request(&test.app, get("/external_search/Patient", Some(&no_dea))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["issue"][0]["severity"], "error");
}

#[tokio::test]
async fn external_search_unavailable_when_not_configured() {
    let store = MockServer::start().await;
    let test = test_app(&store, None);

    let (status, _) = request(
        &test.app,
        get("/external_search/Patient", Some(&clinician_token())),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
