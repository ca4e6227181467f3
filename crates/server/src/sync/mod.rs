//! Patient reconciliation between an external source and the local FHIR store
//!
//! A patient found externally is matched against the local store by name and
//! birth date. With no match a new local patient is created; with a match the
//! local record is kept, merged (new identifiers) or reactivated.
//!
//! The search and the write that follows are two separate calls with no
//! locking in between: two concurrent syncs of the same patient can both miss
//! and both create.

pub mod audit;

use std::fmt;

use patientsearch_core::{
    BUNDLE, Bundle, Lookup, Method, NewResourceDefaults, PATIENT, Patient, SearchParams,
    SyncError, search_params_for,
};
use serde_json::Value as JsonValue;

use crate::fhir::FhirClient;
pub use audit::{AuditEvent, AuditSink, TracingAudit};

/// The caller a sync runs on behalf of
#[derive(Debug, Clone, Copy)]
pub struct Credential<'a> {
    /// Bearer token forwarded to the store
    pub token: &'a str,
    /// Who to name in the audit log
    pub user: Option<&'a str>,
}

/// Steps of a synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NoExternalMatch,
    ExternalMatchFound,
    LocalMatchFound,
    LocalMatchMissing,
    Merged,
    Created,
    Reactivated,
    ReturnedAsIs,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::NoExternalMatch => "no_external_match",
            SyncState::ExternalMatchFound => "external_match_found",
            SyncState::LocalMatchFound => "local_match_found",
            SyncState::LocalMatchMissing => "local_match_missing",
            SyncState::Merged => "merged",
            SyncState::Created => "created",
            SyncState::Reactivated => "reactivated",
            SyncState::ReturnedAsIs => "returned_as_is",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of a sync and the local patient it settled on
#[derive(Debug, Clone, PartialEq)]
pub struct Synced {
    pub patient: JsonValue,
    pub state: SyncState,
}

/// Reconciles external patients with the local store
pub struct PatientSync<'a> {
    store: &'a FhirClient,
    defaults: &'a NewResourceDefaults,
    audit: &'a dyn AuditSink,
}

impl<'a> PatientSync<'a> {
    pub fn new(
        store: &'a FhirClient,
        defaults: &'a NewResourceDefaults,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            store,
            defaults,
            audit,
        }
    }

    /// Sync the patient in an external search bundle.
    ///
    /// Only the first entry is synced; handling several external matches is
    /// not supported yet. That entry must be a Patient. Returns `None` when
    /// the bundle has no entries.
    pub async fn sync_bundle(
        &self,
        credential: Credential<'_>,
        bundle: &Bundle,
        consider_active: bool,
    ) -> Result<Option<Synced>, SyncError> {
        if bundle.resource_type != BUNDLE {
            return Err(SyncError::InvalidInput(format!(
                "Expected bundle; can't process {}",
                bundle.resource_type
            )));
        }

        let Some(entry) = bundle.entries().first() else {
            tracing::debug!(state = %SyncState::NoExternalMatch, "nothing to sync");
            return Ok(None);
        };
        let patient = Patient::from_resource(entry.resource.clone())?;
        tracing::debug!(state = %SyncState::ExternalMatchFound, "syncing external patient");

        self.sync_patient(credential, patient, consider_active)
            .await
            .map(Some)
    }

    /// Insert or update a single patient as needed
    pub async fn sync_patient(
        &self,
        credential: Credential<'_>,
        patient: Patient,
        consider_active: bool,
    ) -> Result<Synced, SyncError> {
        // Search regardless of active status so inactive matches can be restored
        let local = self.find_local_match(credential, &patient, false).await?;
        let params = search_params_for(&patient, false);

        let total = local.match_count();
        if total == 0 {
            tracing::debug!(state = %SyncState::LocalMatchMissing, "no local patient");
            return self.create_patient(credential, patient).await;
        }

        if total > 1 {
            self.audit.record(AuditEvent::DuplicateMatches {
                resource_type: PATIENT.to_string(),
                total,
                params: params.clone(),
            });
        }

        // Duplicates are tolerated; the first match wins
        let Some(first) = local.entries().first() else {
            return Err(SyncError::InvalidInput(format!(
                "search reported {total} matching patients but returned no entries"
            ))
            .during_sync(Method::Get, PATIENT, &params));
        };
        let internal = Patient::from_resource(first.resource.clone())
            .map_err(|e| e.during_sync(Method::Get, PATIENT, &params))?;
        tracing::debug!(
            state = %SyncState::LocalMatchFound,
            patient_id = internal.id().unwrap_or_default(),
            "local patient found"
        );

        self.merge_patient(credential, &patient, internal, consider_active, &params)
            .await
    }

    /// Look up the local copy of `patient`, returning the search Bundle
    pub async fn find_local_match(
        &self,
        credential: Credential<'_>,
        patient: &Patient,
        active_only: bool,
    ) -> Result<Bundle, SyncError> {
        let params = search_params_for(patient, active_only);
        self.search_patients(credential, &params).await
    }

    /// Force a patient active again, whatever its current state
    pub async fn restore_patient(
        &self,
        credential: Credential<'_>,
        mut patient: Patient,
    ) -> Result<JsonValue, SyncError> {
        patient.set_active(true);
        self.put_patient(credential, &patient, None).await
    }

    /// Push details of interest from `external` into `internal`
    async fn merge_patient(
        &self,
        credential: Credential<'_>,
        external: &Patient,
        mut internal: Patient,
        consider_active: bool,
        params: &SearchParams,
    ) -> Result<Synced, SyncError> {
        // Only identifiers are merged for now
        if !external.identifiers_differ(&internal) {
            // Only an explicit `active: false` marks a patient as deleted
            if !consider_active || internal.active() != Lookup::Found(false) {
                return Ok(Synced {
                    patient: internal.into_value(),
                    state: SyncState::ReturnedAsIs,
                });
            }
            internal.set_active(true);
            let patient = self.put_patient(credential, &internal, None).await?;
            return Ok(Synced {
                patient,
                state: SyncState::Reactivated,
            });
        }

        if let Some(identifiers) = external.identifiers() {
            internal.set_identifiers(identifiers.clone());
        }
        if consider_active {
            internal.set_active(true);
        }
        let patient = self
            .put_patient(credential, &internal, Some(params))
            .await?;
        Ok(Synced {
            patient,
            state: SyncState::Merged,
        })
    }

    async fn search_patients(
        &self,
        credential: Credential<'_>,
        params: &SearchParams,
    ) -> Result<Bundle, SyncError> {
        self.store
            .search(credential.token, PATIENT, params)
            .await
            .and_then(Bundle::from_value)
            .map_err(|e| e.during_sync(Method::Get, PATIENT, params))
    }

    async fn create_patient(
        &self,
        credential: Credential<'_>,
        mut patient: Patient,
    ) -> Result<Synced, SyncError> {
        self.defaults.apply_to_patient(&mut patient)?;
        patient.set_active(true);

        let created = self
            .store
            .create(credential.token, PATIENT, &patient.into_value())
            .await
            .map_err(|e| e.during_sync(Method::Post, PATIENT, &SearchParams::new()))?;

        self.audit.record(AuditEvent::changed(
            Method::Post,
            PATIENT,
            created.get("id").and_then(JsonValue::as_str),
            None,
            credential.user,
        ));
        Ok(Synced {
            patient: created,
            state: SyncState::Created,
        })
    }

    async fn put_patient(
        &self,
        credential: Credential<'_>,
        patient: &Patient,
        params: Option<&SearchParams>,
    ) -> Result<JsonValue, SyncError> {
        let Some(id) = patient.id() else {
            return Err(SyncError::InvalidInput(
                "Patient has no id; can't update it".to_string(),
            ));
        };

        let updated = self
            .store
            .update(credential.token, PATIENT, id, &patient.as_value(), params)
            .await
            .map_err(|e| e.during_sync(Method::Put, PATIENT, params.unwrap_or(&SearchParams::new())))?;

        self.audit.record(AuditEvent::changed(
            Method::Put,
            PATIENT,
            Some(id),
            params,
            credential.user,
        ));
        Ok(updated)
    }
}
