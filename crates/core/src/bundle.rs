use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::SyncError;
use crate::identifier::Identifier;
use crate::patient::resource_type;

pub const BUNDLE: &str = "Bundle";

/// FHIR Bundle types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Searchset,
    History,
    Collection,
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
}

/// FHIR Bundle resource as returned by a search.
///
/// Fields this service does not interpret are kept in `extra` so a bundle
/// round-trips unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<BundleType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    /// `None` when the bundle had no `entry` key at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Vec<BundleEntry>>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Link to another page of results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// Single entry in a Bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(default)]
    pub resource: JsonValue,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl BundleEntry {
    pub fn new(full_url: Option<String>, resource: JsonValue) -> Self {
        Self {
            full_url,
            resource,
            extra: Map::new(),
        }
    }
}

impl Bundle {
    /// Create a searchset bundle
    pub fn searchset(total: u64, entries: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: BUNDLE.to_string(),
            bundle_type: Some(BundleType::Searchset),
            total: Some(total),
            link: Vec::new(),
            entry: Some(entries),
            extra: Map::new(),
        }
    }

    /// Parse a raw JSON document, requiring `resourceType` to be `Bundle`
    pub fn from_value(value: JsonValue) -> Result<Self, SyncError> {
        match resource_type(&value) {
            Some(BUNDLE) => serde_json::from_value(value)
                .map_err(|e| SyncError::InvalidInput(format!("Malformed bundle: {}", e))),
            other => Err(SyncError::InvalidInput(format!(
                "Expected bundle; can't process {}",
                other.unwrap_or("resource without resourceType")
            ))),
        }
    }

    pub fn entries(&self) -> &[BundleEntry] {
        self.entry.as_deref().unwrap_or_default()
    }

    /// Number of matches the server reported, falling back to the entry count
    pub fn match_count(&self) -> u64 {
        self.total.unwrap_or(self.entries().len() as u64)
    }

    /// Tag every resource of `resource_type` with `identifier`.
    ///
    /// Resources already carrying the same system and value are left alone,
    /// so tagging twice is the same as tagging once.
    pub fn tag_resources(&self, resource_type_name: &str, identifier: &Identifier) -> Bundle {
        let mut tagged = self.clone();
        for entry in tagged.entry.iter_mut().flatten() {
            if resource_type(&entry.resource) != Some(resource_type_name) {
                continue;
            }
            let JsonValue::Object(fields) = &mut entry.resource else {
                continue;
            };
            let identifiers = fields
                .entry("identifier")
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            if identifiers.is_null() {
                *identifiers = JsonValue::Array(Vec::new());
            }
            let JsonValue::Array(items) = identifiers else {
                continue;
            };
            if !items.iter().any(|raw| identifier.matches(raw)) {
                items.push(serde_json::json!({
                    "system": identifier.system,
                    "value": identifier.value,
                }));
            }
        }
        tagged
    }
}
