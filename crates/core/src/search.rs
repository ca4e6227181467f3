//! Search parameters used to find the local copy of a patient

use std::collections::BTreeMap;

use crate::patient::Patient;
use crate::path::FieldPath;

/// Query term -> value, sent as the query string of a FHIR search
pub type SearchParams = BTreeMap<String, String>;

/// Equality prefix for FHIR search values
const EQ: &str = "eq";

/// Candidate paths for a query term, tried in order
struct Term {
    paths: Vec<FieldPath>,
    query_term: &'static str,
    prefix: &'static str,
}

fn name_and_birth_date_terms() -> [Term; 3] {
    [
        Term {
            paths: vec![
                FieldPath::field("name").then("family"),
                FieldPath::field("name").index(0).then("family"),
            ],
            query_term: "family",
            prefix: "",
        },
        // FHIR models `given` as a list, but searches use a single value
        Term {
            paths: vec![
                FieldPath::field("name").then("given"),
                FieldPath::field("name").then("given").index(0),
                FieldPath::field("name").index(0).then("given").index(0),
            ],
            query_term: "given",
            prefix: "",
        },
        Term {
            paths: vec![FieldPath::field("birthDate")],
            query_term: "birthdate",
            prefix: EQ,
        },
    ]
}

/// Derive search parameters from a patient's name, birth date and, when
/// `active_only` is set, its active flag.
///
/// Only string values (boolean for `active`) contribute; anything else is
/// skipped without error.
pub fn search_params_for(patient: &Patient, active_only: bool) -> SearchParams {
    let mut params = SearchParams::new();

    for term in name_and_birth_date_terms() {
        let first = term
            .paths
            .iter()
            .find_map(|path| patient.lookup(path).as_str().found());
        if let Some(value) = first {
            params.insert(term.query_term.to_string(), format!("{}{}", term.prefix, value));
        }
    }

    if active_only {
        if let Some(active) = patient.active().found() {
            params.insert("active".to_string(), format!("{}{}", EQ, active));
        }
    }

    params
}
