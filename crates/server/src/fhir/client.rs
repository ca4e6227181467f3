//! HTTP client for FHIR stores

use std::time::Duration;

use patientsearch_core::{Method, SearchParams, SyncError};
use reqwest::header::CACHE_CONTROL;
use serde_json::Value as JsonValue;

/// A single call against a FHIR store
#[derive(Debug, Clone, Copy)]
pub struct StoreRequest<'a> {
    pub method: Method,
    pub resource_type: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    pub resource: Option<&'a JsonValue>,
    pub params: Option<&'a SearchParams>,
}

impl<'a> StoreRequest<'a> {
    /// GET `{base}/{resource_type}`, a search
    pub fn search(resource_type: &'a str, params: &'a SearchParams) -> Self {
        Self::new(Method::Get, Some(resource_type)).with_params(params)
    }

    /// GET `{base}` with paging parameters, not scoped to a resource type
    pub fn page(params: &'a SearchParams) -> Self {
        Self::new(Method::Get, None).with_params(params)
    }

    pub fn read(resource_type: &'a str, resource_id: &'a str) -> Self {
        Self::new(Method::Get, Some(resource_type)).with_id(resource_id)
    }

    pub fn create(resource_type: &'a str, resource: &'a JsonValue) -> Self {
        Self::new(Method::Post, Some(resource_type)).with_resource(resource)
    }

    pub fn update(resource_type: &'a str, resource_id: &'a str, resource: &'a JsonValue) -> Self {
        Self::new(Method::Put, Some(resource_type))
            .with_id(resource_id)
            .with_resource(resource)
    }

    pub fn delete(resource_type: &'a str, resource_id: &'a str) -> Self {
        Self::new(Method::Delete, Some(resource_type)).with_id(resource_id)
    }

    pub fn new(method: Method, resource_type: Option<&'a str>) -> Self {
        Self {
            method,
            resource_type,
            resource_id: None,
            resource: None,
            params: None,
        }
    }

    pub fn with_id(mut self, resource_id: &'a str) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn with_resource(mut self, resource: &'a JsonValue) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_params(mut self, params: &'a SearchParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Reject requests that can't be sent, before touching the network
    fn validate(&self) -> Result<(), SyncError> {
        let method = self.method;
        if self.resource_type.is_none() && (method != Method::Get || self.resource_id.is_some()) {
            return Err(SyncError::InvalidRequest(format!(
                "'resource_type' required for {method}"
            )));
        }
        match method {
            Method::Delete if self.resource_id.is_none() => Err(SyncError::InvalidRequest(
                "'resource_id' required for DELETE".to_string(),
            )),
            Method::Post | Method::Put if self.resource.is_none() => Err(
                SyncError::InvalidRequest(format!("'resource' required for {method}")),
            ),
            // Without an id, a PUT is a conditional update and needs criteria
            Method::Put
                if self.resource_id.is_none()
                    && self.params.is_none_or(|params| params.is_empty()) =>
            {
                Err(SyncError::InvalidRequest(
                    "'resource_id' or search params required for PUT".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Client for a FHIR REST endpoint, authenticated with the caller's bearer token.
///
/// The client reports failures but never logs them; callers decide what is
/// worth auditing.
#[derive(Clone)]
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
}

impl FhirClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request and return the JSON body.
    ///
    /// An empty success body (e.g. `204 No Content` after a delete) comes
    /// back as `null`.
    pub async fn request(&self, token: &str, req: StoreRequest<'_>) -> Result<JsonValue, SyncError> {
        req.validate()?;

        let url = self.url_for(req.resource_type, req.resource_id);
        let builder = match req.method {
            // Stores such as HAPI cache searches; new patients must show up at once
            Method::Get => self.http.get(&url).header(CACHE_CONTROL, "no-cache"),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };

        let mut builder = builder.bearer_auth(token);
        if let Some(params) = req.params {
            builder = builder.query(params);
        }
        if let Some(resource) = req.resource {
            builder = builder.json(resource);
        }

        let response = builder.send().await.map_err(unavailable)?;
        read_json(response).await
    }

    pub async fn search(
        &self,
        token: &str,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<JsonValue, SyncError> {
        self.request(token, StoreRequest::search(resource_type, params))
            .await
    }

    /// Follow a paging link, e.g. HAPI's `?_getpages=...&_getpagesoffset=...`
    pub async fn page(&self, token: &str, params: &SearchParams) -> Result<JsonValue, SyncError> {
        self.request(token, StoreRequest::page(params)).await
    }

    pub async fn read(
        &self,
        token: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<JsonValue, SyncError> {
        self.request(token, StoreRequest::read(resource_type, resource_id))
            .await
    }

    pub async fn create(
        &self,
        token: &str,
        resource_type: &str,
        resource: &JsonValue,
    ) -> Result<JsonValue, SyncError> {
        self.request(token, StoreRequest::create(resource_type, resource))
            .await
    }

    pub async fn update(
        &self,
        token: &str,
        resource_type: &str,
        resource_id: &str,
        resource: &JsonValue,
        params: Option<&SearchParams>,
    ) -> Result<JsonValue, SyncError> {
        let mut req = StoreRequest::update(resource_type, resource_id, resource);
        req.params = params;
        self.request(token, req).await
    }

    pub async fn delete(
        &self,
        token: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<JsonValue, SyncError> {
        self.request(token, StoreRequest::delete(resource_type, resource_id))
            .await
    }

    /// Fetch the server's CapabilityStatement, used as a health probe
    pub async fn metadata(&self) -> Result<JsonValue, SyncError> {
        let response = self
            .http
            .get(format!("{}/metadata", self.base_url))
            .send()
            .await
            .map_err(unavailable)?;
        read_json(response).await
    }

    fn url_for(&self, resource_type: Option<&str>, resource_id: Option<&str>) -> String {
        let mut url = self.base_url.clone();
        for segment in [resource_type, resource_id].into_iter().flatten() {
            url.push('/');
            url.push_str(segment);
        }
        url
    }
}

fn unavailable(err: reqwest::Error) -> SyncError {
    SyncError::StoreUnavailable(err.to_string())
}

async fn read_json(response: reqwest::Response) -> Result<JsonValue, SyncError> {
    let status = response.status();
    let body = response.text().await.map_err(unavailable)?;

    if !status.is_success() {
        return Err(SyncError::RequestFailed {
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(JsonValue::Null);
    }
    serde_json::from_str(&body).map_err(|_| SyncError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}
