//! Server configuration

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use patientsearch_core::Identifier;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Configuration errors, reported at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Failed to read {path}: {source}")]
    ExtensionsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Base URL of the local FHIR store
    pub map_api: String,
    /// Base URL of the external search source; external search is disabled without it
    pub external_fhir_api: Option<String>,
    /// Token claim sent to the external source to identify the clinician
    pub external_identity_claim: String,
    /// Identifier added to patients found in the external source
    pub found_identifier: Identifier,
    /// Extensions added to every newly created Patient
    pub new_patient_extensions: Vec<JsonValue>,
    pub request_timeout: Duration,
    pub cors_origins: Vec<String>,
    pub rate_limit_rps: NonZeroU32,
    pub version_string: Option<String>,
    pub sof_client_launch_url: Option<String>,
    pub sof_host_fhir_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            map_api: "http://localhost:8080/fhir".into(),
            external_fhir_api: None,
            external_identity_claim: "DEA".into(),
            found_identifier: Identifier::new("urn:patientsearch:external-source", "found"),
            new_patient_extensions: Vec::new(),
            request_timeout: Duration::from_secs(30),
            cors_origins: vec!["*".into()],
            rate_limit_rps: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
            version_string: None,
            sof_client_launch_url: None,
            sof_host_fhir_url: None,
        }
    }
}

/// Setting names that are never exposed
const HIDDEN_SETTINGS: [&str; 2] = ["SECRET", "KEY"];

/// True if a setting may be shown to users
pub fn is_public_setting(key: &str) -> bool {
    let key = key.to_uppercase();
    !HIDDEN_SETTINGS.iter().any(|pattern| key.contains(pattern))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };
        let rate_limit_rps = match var("RATE_LIMIT_RPS") {
            Some(raw) => {
                let rps = parse_number("RATE_LIMIT_RPS", &raw)?;
                u32::try_from(rps)
                    .ok()
                    .and_then(NonZeroU32::new)
                    .ok_or_else(|| ConfigError::Invalid {
                        var: "RATE_LIMIT_RPS",
                        reason: format!("{rps} is out of range"),
                    })?
            }
            None => defaults.rate_limit_rps,
        };
        let new_patient_extensions = match var("NEW_PATIENT_EXTENSIONS") {
            Some(raw) => decode_extensions(&raw)?,
            None => Vec::new(),
        };
        let cors_origins = match var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            bind_address: var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            map_api: var("MAP_API").unwrap_or(defaults.map_api),
            external_fhir_api: var("EXTERNAL_FHIR_API"),
            external_identity_claim: var("EXTERNAL_IDENTITY_CLAIM")
                .unwrap_or(defaults.external_identity_claim),
            found_identifier: Identifier::new(
                var("FOUND_IDENTIFIER_SYSTEM").unwrap_or(defaults.found_identifier.system),
                var("FOUND_IDENTIFIER_VALUE").unwrap_or(defaults.found_identifier.value),
            ),
            new_patient_extensions,
            request_timeout,
            cors_origins,
            rate_limit_rps,
            version_string: var("VERSION_STRING"),
            sof_client_launch_url: var("SOF_CLIENT_LAUNCH_URL"),
            sof_host_fhir_url: var("SOF_HOST_FHIR_URL"),
        })
    }

    /// Settings the front end may read, keyed by variable name
    pub fn settings(&self) -> Map<String, JsonValue> {
        let optional = |v: &Option<String>| v.clone().map_or(JsonValue::Null, JsonValue::String);

        let mut settings = Map::new();
        settings.insert("MAP_API".into(), self.map_api.clone().into());
        settings.insert(
            "EXTERNAL_FHIR_API".into(),
            optional(&self.external_fhir_api),
        );
        settings.insert(
            "EXTERNAL_IDENTITY_CLAIM".into(),
            self.external_identity_claim.clone().into(),
        );
        settings.insert(
            "FOUND_IDENTIFIER_SYSTEM".into(),
            self.found_identifier.system.clone().into(),
        );
        settings.insert(
            "FOUND_IDENTIFIER_VALUE".into(),
            self.found_identifier.value.clone().into(),
        );
        settings.insert(
            "NEW_PATIENT_EXTENSIONS".into(),
            JsonValue::Array(self.new_patient_extensions.clone()),
        );
        settings.insert(
            "REQUEST_TIMEOUT_SECS".into(),
            self.request_timeout.as_secs().into(),
        );
        settings.insert("RATE_LIMIT_RPS".into(), self.rate_limit_rps.get().into());
        settings.insert("VERSION_STRING".into(), optional(&self.version_string));
        settings.insert(
            "SOF_CLIENT_LAUNCH_URL".into(),
            optional(&self.sof_client_launch_url),
        );
        settings.insert(
            "SOF_HOST_FHIR_URL".into(),
            optional(&self.sof_host_fhir_url),
        );

        settings.retain(|key, _| is_public_setting(key));
        settings
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::Invalid {
        var,
        reason: format!("{raw:?}: {e}"),
    })
}

/// Extensions come either inline as a JSON array or as a path to a `.json` file
fn decode_extensions(raw: &str) -> Result<Vec<JsonValue>, ConfigError> {
    let raw = raw.trim();
    let json = if raw.ends_with(".json") {
        let path = PathBuf::from(raw);
        std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::ExtensionsFile { path, source })?
    } else {
        raw.to_string()
    };

    serde_json::from_str(&json).map_err(|e| ConfigError::Invalid {
        var: "NEW_PATIENT_EXTENSIONS",
        reason: format!("expected a JSON array of extensions: {e}"),
    })
}
