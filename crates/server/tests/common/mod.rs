//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header, encode};
use patientsearch_server::fhir::FhirClient;
use patientsearch_server::sync::{AuditEvent, AuditSink};
use serde_json::{Value as JsonValue, json};
use wiremock::MockServer;

/// Audit sink that keeps events for inspection
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Client for the `/fhir` base of a mock server
pub fn store_client(server: &MockServer) -> FhirClient {
    FhirClient::new(&format!("{}/fhir", server.uri()), Duration::from_secs(5)).unwrap()
}

/// A JWT carrying `claims`, signed with a key the server never checks
pub fn jwt(claims: JsonValue) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"gateway-secret"),
    )
    .unwrap()
}

/// Token for a clinician with an identity claim, valid for an hour
pub fn clinician_token() -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    jwt(json!({
        "sub": "b5e1c0de",
        "email": "fake@testy.org",
        "name": "Fake Clinician",
        "DEA": "AB1234563",
        "exp": exp
    }))
}

/// Jane Doe as returned by an external source: no local id
pub fn jane_doe() -> JsonValue {
    json!({
        "resourceType": "Patient",
        "name": [{"family": "Doe", "given": ["Jane"]}],
        "birthDate": "1980-01-01",
        "identifier": [{"system": "http://example.org/mrn", "value": "123"}]
    })
}

/// Jane Doe as stored locally under `id`
pub fn stored_jane_doe(id: &str) -> JsonValue {
    let mut patient = jane_doe();
    patient["id"] = json!(id);
    patient["active"] = json!(true);
    patient
}

pub fn searchset(total: u64, resources: Vec<JsonValue>) -> JsonValue {
    let entries: Vec<JsonValue> = resources
        .into_iter()
        .map(|resource| json!({"resource": resource}))
        .collect();
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": total,
        "entry": entries
    })
}

pub fn site_extension() -> JsonValue {
    json!({"url": "http://example.org/fhir/StructureDefinition/site", "valueString": "clinic-a"})
}
