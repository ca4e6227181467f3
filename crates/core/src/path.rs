//! Typed lookups into semi-structured FHIR documents
//!
//! A [`FieldPath`] walks object fields and array indexes. Resolution tells a
//! plain miss (the field is absent or `null`) apart from a document whose shape
//! does not fit the path (indexing into an object, reading a field of a list).

use std::fmt;

use serde_json::{Map, Value as JsonValue};

/// Result of resolving a path or converting the value found there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Nothing at that location
    Missing,
    /// Something is there, but not of the expected shape
    WrongShape,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing | Lookup::WrongShape => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

impl<'a> Lookup<&'a JsonValue> {
    pub fn as_str(self) -> Lookup<&'a str> {
        match self {
            Lookup::Found(JsonValue::String(s)) => Lookup::Found(s.as_str()),
            Lookup::Found(_) => Lookup::WrongShape,
            Lookup::Missing => Lookup::Missing,
            Lookup::WrongShape => Lookup::WrongShape,
        }
    }

    pub fn as_bool(self) -> Lookup<bool> {
        match self {
            Lookup::Found(JsonValue::Bool(b)) => Lookup::Found(*b),
            Lookup::Found(_) => Lookup::WrongShape,
            Lookup::Missing => Lookup::Missing,
            Lookup::WrongShape => Lookup::WrongShape,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(&'static str),
    Index(usize),
}

/// A path such as `name[0].given[0]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Start a path at a top-level field
    pub fn field(name: &'static str) -> Self {
        Self {
            segments: vec![Segment::Field(name)],
        }
    }

    /// Descend into a nested field
    pub fn then(mut self, name: &'static str) -> Self {
        self.segments.push(Segment::Field(name));
        self
    }

    /// Descend into a list element
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn resolve<'a>(&self, doc: &'a JsonValue) -> Lookup<&'a JsonValue> {
        walk(&self.segments, doc)
    }

    /// Resolve against the top-level fields of a resource
    pub fn resolve_in<'a>(&self, fields: &'a Map<String, JsonValue>) -> Lookup<&'a JsonValue> {
        match self.segments.split_first() {
            Some((Segment::Field(name), rest)) => match fields.get(*name) {
                None | Some(JsonValue::Null) => Lookup::Missing,
                Some(value) => walk(rest, value),
            },
            _ => Lookup::WrongShape,
        }
    }
}

fn walk<'a>(segments: &[Segment], doc: &'a JsonValue) -> Lookup<&'a JsonValue> {
    let mut current = doc;
    for segment in segments {
        let next = match (segment, current) {
            (Segment::Field(name), JsonValue::Object(map)) => map.get(*name),
            (Segment::Index(index), JsonValue::Array(items)) => items.get(*index),
            _ => return Lookup::WrongShape,
        };
        current = match next {
            None | Some(JsonValue::Null) => return Lookup::Missing,
            Some(value) => value,
        };
    }
    Lookup::Found(current)
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> JsonValue {
        json!({
            "resourceType": "Patient",
            "name": [{"family": "Doe", "given": ["Jane", "Q"]}],
            "birthDate": "1980-01-01",
            "active": false,
            "gender": null
        })
    }

    #[test]
    fn resolves_nested_list_paths() {
        let doc = patient();
        let path = FieldPath::field("name").index(0).then("given").index(1);

        assert_eq!(path.resolve(&doc).as_str(), Lookup::Found("Q"));
        assert_eq!(path.to_string(), "name[0].given[1]");
    }

    #[test]
    fn field_of_a_list_is_wrong_shape() {
        let doc = patient();

        assert_eq!(
            FieldPath::field("name").then("family").resolve(&doc),
            Lookup::WrongShape
        );
    }

    #[test]
    fn absent_and_null_fields_are_missing() {
        let doc = patient();

        assert!(FieldPath::field("telecom").resolve(&doc).is_missing());
        assert!(FieldPath::field("gender").resolve(&doc).is_missing());
        assert!(
            FieldPath::field("name")
                .index(3)
                .then("family")
                .resolve(&doc)
                .is_missing()
        );
    }

    #[test]
    fn conversions_report_wrong_shape() {
        let doc = patient();

        assert_eq!(
            FieldPath::field("name").resolve(&doc).as_str(),
            Lookup::WrongShape
        );
        assert_eq!(
            FieldPath::field("active").resolve(&doc).as_bool(),
            Lookup::Found(false)
        );
        assert_eq!(
            FieldPath::field("birthDate").resolve(&doc).as_bool(),
            Lookup::WrongShape
        );
    }
}
