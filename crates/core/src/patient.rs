//! Patient resources as semi-structured documents
//!
//! Only the handful of fields the reconciliation logic cares about get typed
//! accessors; everything else is carried through untouched.

use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue};

use crate::error::SyncError;
use crate::identifier::identifier_key;
use crate::path::{FieldPath, Lookup};

pub const PATIENT: &str = "Patient";

/// `resourceType` of a raw resource, if it has one
pub fn resource_type(resource: &JsonValue) -> Option<&str> {
    resource.get("resourceType").and_then(JsonValue::as_str)
}

/// A Patient resource
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    fields: Map<String, JsonValue>,
}

impl Patient {
    /// Take ownership of a raw resource, checking it is a Patient
    pub fn from_resource(resource: JsonValue) -> Result<Self, SyncError> {
        let JsonValue::Object(fields) = resource else {
            return Err(SyncError::InvalidInput(
                "Patient resource must be a JSON object".to_string(),
            ));
        };
        match fields.get("resourceType").and_then(JsonValue::as_str) {
            Some(PATIENT) => Ok(Self { fields }),
            Some(other) => Err(SyncError::UnsupportedResourceType(other.to_string())),
            None => Err(SyncError::InvalidInput(
                "resource is missing resourceType".to_string(),
            )),
        }
    }

    pub fn lookup(&self, path: &FieldPath) -> Lookup<&JsonValue> {
        path.resolve_in(&self.fields)
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(JsonValue::as_str)
    }

    pub fn active(&self) -> Lookup<bool> {
        self.lookup(&FieldPath::field("active")).as_bool()
    }

    pub fn set_active(&mut self, active: bool) {
        self.fields
            .insert("active".to_string(), JsonValue::Bool(active));
    }

    /// The raw `identifier` element, when present
    pub fn identifiers(&self) -> Option<&JsonValue> {
        self.lookup(&FieldPath::field("identifier")).found()
    }

    pub fn set_identifiers(&mut self, identifiers: JsonValue) {
        self.fields.insert("identifier".to_string(), identifiers);
    }

    /// Identifiers as a set of `system|value` keys.
    ///
    /// `None` when the patient has no usable `identifier` list.
    pub fn identifier_keys(&self) -> Option<BTreeSet<String>> {
        match self.identifiers()? {
            JsonValue::Array(items) => Some(items.iter().map(identifier_key).collect()),
            _ => None,
        }
    }

    /// Whether `self`, taken as the incoming record, carries identifiers that
    /// `stored` lacks (or vice versa).
    ///
    /// A record without identifiers never counts as different.
    pub fn identifiers_differ(&self, stored: &Patient) -> bool {
        if self == stored {
            return false;
        }
        let Some(incoming) = self.identifier_keys() else {
            return false;
        };
        incoming != stored.identifier_keys().unwrap_or_default()
    }

    /// Append extension elements, creating the `extension` list if needed
    pub fn append_extensions(&mut self, extensions: &[JsonValue]) -> Result<(), SyncError> {
        let list = self
            .fields
            .entry("extension")
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if list.is_null() {
            *list = JsonValue::Array(Vec::new());
        }
        match list {
            JsonValue::Array(items) => {
                items.extend(extensions.iter().cloned());
                Ok(())
            }
            _ => Err(SyncError::InvalidInput(
                "Patient.extension must be a list".to_string(),
            )),
        }
    }

    pub fn as_value(&self) -> JsonValue {
        JsonValue::Object(self.fields.clone())
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.fields)
    }
}
