use std::collections::BTreeMap;

use thiserror::Error;

use crate::method::Method;

/// Errors raised while talking to the FHIR stores or reconciling patients
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed bundle or resource handed to the engine
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Can't sync resourceType {0}")]
    UnsupportedResourceType(String),

    /// Request rejected before reaching the network
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure (connection refused, timeout)
    #[error("FHIR store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered with a non-success status
    #[error("FHIR store request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// A remote call failed in the middle of a reconciliation
    #[error("{method} {resource_type} failed during sync: {source}")]
    SyncFailed {
        method: Method,
        resource_type: String,
        params: BTreeMap<String, String>,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Wrap a store error with the call that produced it.
    ///
    /// Errors that are already wrapped are returned unchanged so the
    /// innermost call stays visible.
    pub fn during_sync(
        self,
        method: Method,
        resource_type: &str,
        params: &BTreeMap<String, String>,
    ) -> Self {
        match self {
            wrapped @ SyncError::SyncFailed { .. } => wrapped,
            source => SyncError::SyncFailed {
                method,
                resource_type: resource_type.to_string(),
                params: params.clone(),
                source: Box::new(source),
            },
        }
    }

    /// The underlying error, looking through `SyncFailed` wrappers
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::SyncFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
