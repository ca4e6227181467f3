//! patientsearch-core: FHIR documents and patient reconciliation rules
//!
//! This crate holds the IO-free half of the patient search service:
//! Bundle and Patient documents, identifier tagging, the search parameters
//! used to find a local copy of a patient, defaults for new resources, and
//! the error taxonomy shared with the server.

pub mod bundle;
pub mod defaults;
pub mod error;
pub mod identifier;
pub mod method;
pub mod outcome;
pub mod path;
pub mod patient;
pub mod search;

pub use bundle::{BUNDLE, Bundle, BundleEntry, BundleLink, BundleType};
pub use defaults::NewResourceDefaults;
pub use error::SyncError;
pub use identifier::{Identifier, identifier_key};
pub use method::Method;
pub use outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
pub use path::{FieldPath, Lookup};
pub use patient::{PATIENT, Patient, resource_type};
pub use search::{SearchParams, search_params_for};
