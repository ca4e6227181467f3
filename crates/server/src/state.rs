//! Shared application state

use std::sync::Arc;

use patientsearch_core::NewResourceDefaults;

use crate::config::{Config, ConfigError};
use crate::fhir::{ExternalSource, FhirClient};
use crate::sync::{AuditSink, PatientSync, TracingAudit};

/// Everything a request handler needs. Cheap to clone; nothing in here is
/// mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Local FHIR store
    pub store: FhirClient,
    /// External search source, when configured
    pub external: Option<ExternalSource>,
    pub defaults: Arc<NewResourceDefaults>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let store = FhirClient::new(&config.map_api, config.request_timeout)?;
        let external = match &config.external_fhir_api {
            Some(url) => Some(ExternalSource::new(
                FhirClient::new(url, config.request_timeout)?,
                config.external_identity_claim.clone(),
            )),
            None => None,
        };
        let defaults = NewResourceDefaults::new(config.new_patient_extensions.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            external,
            defaults: Arc::new(defaults),
            audit: Arc::new(TracingAudit),
        })
    }

    /// Replace the audit sink
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn patient_sync(&self) -> PatientSync<'_> {
        PatientSync::new(&self.store, &self.defaults, self.audit.as_ref())
    }
}
