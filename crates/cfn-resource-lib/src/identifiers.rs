//! Primary identifier bookkeeping.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::case::CaseTransformer;
use crate::error::{Error, Result};

/// Ordered set of the properties that identify a resource instance.
///
/// Names are declared in wire casing and must all be top-level properties of
/// the resource schema; the callback spelling is derived once at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeySet {
    wire: Vec<String>,
    callback: Vec<String>,
}

impl PrimaryKeySet {
    pub fn new<I, S>(
        type_name: &str,
        names: I,
        declared: &BTreeSet<String>,
        casing: &CaseTransformer,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut wire: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !declared.contains(&name) {
                return Err(Error::UnknownIdentifier {
                    name,
                    type_name: type_name.to_string(),
                });
            }
            if !wire.contains(&name) {
                wire.push(name);
            }
        }

        if wire.is_empty() {
            return Err(Error::EmptyPrimaryIdentifier {
                type_name: type_name.to_string(),
            });
        }

        let callback = wire.iter().map(|name| casing.to_callback_key(name)).collect();
        Ok(Self { wire, callback })
    }

    /// Extracts property names from `primaryIdentifier` JSON pointers.
    pub fn names_from_pointers<'a>(
        pointers: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>> {
        pointers
            .into_iter()
            .map(|pointer| match pointer.strip_prefix("/properties/") {
                Some(name) if !name.is_empty() && !name.contains('/') => Ok(name.to_string()),
                _ => Err(Error::InvalidIdentifierPointer {
                    pointer: pointer.to_string(),
                }),
            })
            .collect()
    }

    pub fn wire_names(&self) -> &[String] {
        &self.wire
    }

    pub fn callback_names(&self) -> &[String] {
        &self.callback
    }

    pub fn contains_wire(&self, name: &str) -> bool {
        self.wire.iter().any(|n| n == name)
    }

    /// Wire identifier names that are absent or null in `properties`.
    pub fn missing_wire<'a>(&'a self, properties: &Map<String, Value>) -> Vec<&'a str> {
        missing(&self.wire, properties)
    }

    /// Callback identifier names that are absent or null in `properties`.
    pub fn missing_callback<'a>(&'a self, properties: &Map<String, Value>) -> Vec<&'a str> {
        missing(&self.callback, properties)
    }

    /// Copy of `properties` restricted to the identifier fields.
    pub fn project_wire(&self, properties: &Map<String, Value>) -> Map<String, Value> {
        self.wire
            .iter()
            .filter_map(|name| {
                properties
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    /// Removes identifier fields, returning the names that were present.
    pub fn strip_wire(&self, properties: &mut Map<String, Value>) -> Vec<String> {
        self.wire
            .iter()
            .filter(|name| properties.remove(name.as_str()).is_some())
            .cloned()
            .collect()
    }
}

fn missing<'a>(names: &'a [String], properties: &Map<String, Value>) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| properties.get(name.as_str()).map_or(true, Value::is_null))
        .map(String::as_str)
        .collect()
}
