use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// FHIR Identifier used to tag the provenance of a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

impl Identifier {
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            value: value.into(),
        }
    }

    /// `system|value`, the token form used by FHIR search
    pub fn key(&self) -> String {
        format!("{}|{}", self.system, self.value)
    }

    /// True if the raw identifier element carries the same system and value
    pub fn matches(&self, raw: &JsonValue) -> bool {
        identifier_key(raw) == self.key()
    }
}

/// `system|value` key of a raw identifier element.
///
/// Absent parts count as empty strings; non-string values use their JSON text.
pub fn identifier_key(raw: &JsonValue) -> String {
    format!("{}|{}", part(raw, "system"), part(raw, "value"))
}

fn part(raw: &JsonValue, field: &str) -> String {
    match raw.get(field) {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
