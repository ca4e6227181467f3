//! Audit trail for changes pushed to the local FHIR store

use patientsearch_core::{Method, SearchParams};

/// Something worth recording in the audit log
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// A mutating request succeeded against the store
    ResourceChanged {
        method: Method,
        resource_type: String,
        resource_id: Option<String>,
        params: SearchParams,
        user: Option<String>,
    },
    /// A local search matched more than one record; the first one was used
    DuplicateMatches {
        resource_type: String,
        total: u64,
        params: SearchParams,
    },
}

impl AuditEvent {
    pub fn changed(
        method: Method,
        resource_type: &str,
        resource_id: Option<&str>,
        params: Option<&SearchParams>,
        user: Option<&str>,
    ) -> Self {
        AuditEvent::ResourceChanged {
            method,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.map(str::to_string),
            params: params.cloned().unwrap_or_default(),
            user: user.map(str::to_string),
        }
    }
}

/// Receives audit events. Shared across requests, so implementations must be
/// thread safe.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as `tracing` events on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::ResourceChanged {
                method,
                resource_type,
                resource_id,
                params,
                user,
            } => {
                let id = resource_id.as_deref().unwrap_or_default();
                tracing::info!(
                    target: "audit",
                    method = %method,
                    resource_type = %resource_type,
                    resource_id = %id,
                    user = user.as_deref().unwrap_or("unknown"),
                    params = ?params,
                    tags = ?[resource_type.as_str(), method.as_str()],
                    "{} {}/{}",
                    method,
                    resource_type,
                    id
                );
            }
            AuditEvent::DuplicateMatches {
                resource_type,
                total,
                params,
            } => {
                tracing::warn!(
                    target: "audit",
                    resource_type = %resource_type,
                    total = total,
                    params = ?params,
                    "expected ONE matching {}, found {}",
                    resource_type,
                    total
                );
            }
        }
    }
}
