//! External patient search source (e.g. a prescription monitoring program)

use patientsearch_core::{Bundle, SearchParams, SyncError};

use super::client::FhirClient;

/// Read-only FHIR source queried on behalf of a clinician.
///
/// Every search carries a query parameter identifying the caller, taken from
/// the clinician's profile.
#[derive(Clone)]
pub struct ExternalSource {
    client: FhirClient,
    identity_param: String,
}

impl ExternalSource {
    pub fn new(client: FhirClient, identity_param: impl Into<String>) -> Self {
        Self {
            client,
            identity_param: identity_param.into(),
        }
    }

    pub fn identity_param(&self) -> &str {
        &self.identity_param
    }

    /// Search `resource_type` with the given criteria, returning a Bundle
    pub async fn search(
        &self,
        token: &str,
        resource_type: &str,
        params: &SearchParams,
        caller_id: &str,
    ) -> Result<Bundle, SyncError> {
        if resource_type.is_empty() {
            return Err(SyncError::InvalidInput(
                "Required `resource_type` not included".to_string(),
            ));
        }

        let mut params = params.clone();
        params.insert(self.identity_param.clone(), caller_id.to_string());

        let body = self.client.search(token, resource_type, &params).await?;
        Bundle::from_value(body)
    }
}
