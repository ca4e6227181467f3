//! Clients for the local FHIR store and the external search source

pub mod client;
pub mod external;

pub use client::{FhirClient, StoreRequest};
pub use external::ExternalSource;
