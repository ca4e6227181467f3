//! Product defaults applied to resources before they are first stored

use serde_json::Value as JsonValue;

use crate::error::SyncError;
use crate::patient::{PATIENT, Patient, resource_type};

/// Fields added to freshly created resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewResourceDefaults {
    patient_extensions: Vec<JsonValue>,
}

impl NewResourceDefaults {
    pub fn new(patient_extensions: Vec<JsonValue>) -> Self {
        Self { patient_extensions }
    }

    pub fn patient_extensions(&self) -> &[JsonValue] {
        &self.patient_extensions
    }

    /// Apply defaults to a raw resource.
    ///
    /// Resources that already have an `id` are not new and pass through, as do
    /// resource types without configured defaults.
    pub fn apply(&self, resource: JsonValue) -> Result<JsonValue, SyncError> {
        if resource.get("id").is_some_and(|id| !id.is_null()) {
            return Ok(resource);
        }
        if resource_type(&resource) != Some(PATIENT) {
            return Ok(resource);
        }
        let mut patient = Patient::from_resource(resource)?;
        self.apply_to_patient(&mut patient)?;
        Ok(patient.into_value())
    }

    pub fn apply_to_patient(&self, patient: &mut Patient) -> Result<(), SyncError> {
        if patient.id().is_some() || self.patient_extensions.is_empty() {
            return Ok(());
        }
        patient.append_extensions(&self.patient_extensions)
    }
}
