//! Pass-through access to the local FHIR store
//!
//! Requests are forwarded with the caller's token; the store does its own
//! authorization. Mutations go to the audit sink.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use patientsearch_core::{Method, PATIENT, Patient, SearchParams, resource_type};
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;
use crate::sync::AuditEvent;

/// Page size asked of the store unless the caller says otherwise
const DEFAULT_COUNT: &str = "1000";

/// GET /fhir - Follow a paging link returned in a search Bundle
pub async fn page(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SearchParams>,
) -> Result<Json<JsonValue>, AppError> {
    let bundle = state.store.page(identity.token(), &params).await?;
    Ok(Json(bundle))
}

/// GET /fhir/{resource_type} - Search, returning the store's Bundle
pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(resource_type): Path<String>,
    Query(query): Query<SearchParams>,
) -> Result<Json<JsonValue>, AppError> {
    let mut params = SearchParams::from([("_count".to_string(), DEFAULT_COUNT.to_string())]);
    params.extend(query);

    let bundle = state
        .store
        .search(identity.token(), &resource_type, &params)
        .await?;
    Ok(Json(bundle))
}

/// GET /fhir/{resource_type}/{id}
pub async fn read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, AppError> {
    let resource = state
        .store
        .read(identity.token(), &resource_type, &id)
        .await?;
    Ok(Json(resource))
}

/// POST /fhir/{resource_type} - Create, applying the defaults for new resources
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(path_type): Path<String>,
    Json(body): Json<JsonValue>,
) -> Result<Response, AppError> {
    check_resource_type(&path_type, &body)?;
    let resource = state.defaults.apply(body)?;

    let created = state
        .store
        .create(identity.token(), &path_type, &resource)
        .await?;

    state.audit.record(AuditEvent::changed(
        Method::Post,
        &path_type,
        created.get("id").and_then(JsonValue::as_str),
        None,
        identity.user_id(),
    ));
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// PUT /fhir/{resource_type}/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((path_type, id)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> Result<Json<JsonValue>, AppError> {
    check_resource_type(&path_type, &body)?;
    if let Some(body_id) = body.get("id").and_then(JsonValue::as_str) {
        if body_id != id {
            return Err(AppError::BadRequest(format!(
                "Resource id '{body_id}' does not match URL id '{id}'"
            )));
        }
    }

    let updated = state
        .store
        .update(identity.token(), &path_type, &id, &body, None)
        .await?;

    state.audit.record(AuditEvent::changed(
        Method::Put,
        &path_type,
        Some(&id),
        None,
        identity.user_id(),
    ));
    Ok(Json(updated))
}

/// DELETE /fhir/{resource_type}/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let outcome = state
        .store
        .delete(identity.token(), &resource_type, &id)
        .await?;

    state.audit.record(AuditEvent::changed(
        Method::Delete,
        &resource_type,
        Some(&id),
        None,
        identity.user_id(),
    ));

    if outcome.is_null() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(outcome).into_response())
}

/// PUT /fhir/Patient/{id}/$restore - Mark a deleted patient active again
pub async fn restore_patient(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = state.store.read(identity.token(), PATIENT, &id).await?;
    let patient = Patient::from_resource(stored)?;

    let restored = state
        .patient_sync()
        .restore_patient(identity.credential(), patient)
        .await?;
    tracing::info!(patient_id = %id, user_id = identity.user_id(), "patient restored");
    Ok(Json(restored))
}

/// The body's `resourceType`, when present, must match the URL
fn check_resource_type(path_type: &str, body: &JsonValue) -> Result<(), AppError> {
    if !body.is_object() {
        return Err(AppError::BadRequest(
            "Request body must be a FHIR resource".to_string(),
        ));
    }
    match resource_type(body) {
        Some(body_type) if body_type != path_type => Err(AppError::BadRequest(format!(
            "Resource type '{body_type}' does not match URL type '{path_type}'"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_type_must_match_path() {
        assert!(check_resource_type("Patient", &json!({"resourceType": "Patient"})).is_ok());
        assert!(check_resource_type("Patient", &json!({"name": []})).is_ok());
        assert!(check_resource_type("Patient", &json!({"resourceType": "Observation"})).is_err());
        assert!(check_resource_type("Patient", &json!([1, 2])).is_err());
    }
}
