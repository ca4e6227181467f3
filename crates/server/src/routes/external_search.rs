//! Search an external source and pull the match into the local store

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use patientsearch_core::{Bundle, PATIENT, SearchParams, SyncError};
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;
use crate::sync::SyncState;

/// GET /external_search/{resource_type} - Search the external source and sync
/// the first match into the local store. Inactive local matches stay inactive.
pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(resource_type): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Bundle>, AppError> {
    external_search(&state, &identity, &resource_type, &params, false)
        .await
        .map(Json)
}

/// PUT /external_search/{resource_type} - As GET, but an inactive local match
/// is reactivated.
pub async fn search_and_restore(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(resource_type): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Bundle>, AppError> {
    external_search(&state, &identity, &resource_type, &params, true)
        .await
        .map(Json)
}

async fn external_search(
    state: &AppState,
    identity: &Identity,
    resource_type: &str,
    params: &SearchParams,
    consider_active: bool,
) -> Result<Bundle, AppError> {
    let Some(external) = state.external.as_ref() else {
        return Err(AppError::ServiceUnavailable(
            "External search is not configured".to_string(),
        ));
    };
    let claim = external.identity_param();
    let Some(caller_id) = identity.claim_str(claim) else {
        return Err(SyncError::InvalidInput(format!(
            "User profile has no {claim}; required for external search"
        ))
        .into());
    };

    let found = external
        .search(identity.token(), resource_type, params, caller_id)
        .await?;
    if found.entries().len() > 1 {
        tracing::warn!(
            count = found.entries().len(),
            "multiple patients returned from external search"
        );
    }
    let mut bundle = found.tag_resources(PATIENT, &state.config.found_identifier);

    let result = state
        .patient_sync()
        .sync_bundle(identity.credential(), &bundle, consider_active)
        .await;
    let outcome = match &result {
        Ok(Some(synced)) => synced.state.as_str(),
        Ok(None) => SyncState::NoExternalMatch.as_str(),
        Err(_) => "failed",
    };
    metrics::counter!("patient_sync_total", "outcome" => outcome).increment(1);

    let Some(synced) = result? else {
        return Ok(bundle);
    };

    // Stamp the local id on the synced patient unless it already has one
    let local_id = synced.patient.get("id").and_then(JsonValue::as_str);
    let first = bundle
        .entry
        .as_mut()
        .and_then(|entries| entries.first_mut())
        .and_then(|entry| entry.resource.as_object_mut());
    if let (Some(local_id), Some(resource)) = (local_id, first) {
        resource
            .entry("id")
            .or_insert_with(|| JsonValue::String(local_id.to_string()));
    }

    tracing::info!(
        tags = ?["search"],
        subject_id = local_id.unwrap_or_default(),
        user_id = identity.user_id(),
        outcome = %synced.state,
        "patient search found match"
    );
    Ok(bundle)
}
