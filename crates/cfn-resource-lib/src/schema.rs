//! Schema gate: compiled validators with loose type coercion.
//!
//! CloudFormation delivers every scalar in a template as a string, so a
//! declared `"type": "integer"` property routinely arrives as `"10"`. Before
//! validating, values are coerced toward the declared scalar types the same
//! way a loosely-typed validator would (`"10"` → `10`, `"true"` → `true`,
//! `5` → `"5"`). The caller's input is never mutated.

use std::collections::BTreeSet;
use std::fmt;

use jsonschema::{Draft, Validator};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result, ValidationFailure};

/// Bound on `$ref` / `allOf` indirections followed while coercing.
const MAX_SCHEMA_INDIRECTION: usize = 32;

/// A schema document compiled into a validator.
pub struct CompiledSchema {
    subject: String,
    document: Value,
    validator: Validator,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("subject", &self.subject)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compiles `document`; `subject` names the validated value in errors.
    pub fn compile(subject: impl Into<String>, document: Value) -> Result<Self> {
        let subject = subject.into();
        let mut document = document;
        if let Some(map) = document.as_object_mut() {
            // Provider definition meta-schemas are not resolvable offline.
            let foreign_meta = map
                .get("$schema")
                .and_then(Value::as_str)
                .is_some_and(|uri| !uri.contains("json-schema.org"));
            if foreign_meta {
                map.remove("$schema");
            }
        }

        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&document)
            .map_err(|e| Error::InvalidSchema {
                subject: subject.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            subject,
            document,
            validator,
        })
    }

    /// Schema accepting any JSON object.
    pub fn any_object(subject: impl Into<String>) -> Result<Self> {
        Self::compile(subject, serde_json::json!({ "type": "object" }))
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Coerces and validates `value`, returning the coerced copy.
    pub fn ensure(&self, value: &Value) -> std::result::Result<Value, ValidationFailure> {
        let mut coerced = value.clone();
        coerce(&self.document, &self.document, &mut coerced, 0);

        let errors: Vec<String> = self
            .validator
            .iter_errors(&coerced)
            .map(|err| err.to_string())
            .collect();

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(ValidationFailure::new(self.subject.clone(), errors))
        }
    }

    /// Names declared under the top-level `properties`.
    pub fn top_level_properties(&self) -> BTreeSet<String> {
        self.document
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every property name declared anywhere in the document, including
    /// nested objects and `definitions`.
    pub fn declared_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        collect_property_keys(&self.document, &mut keys);
        keys
    }

    /// Recompiles with `names` removed from the top-level `required` list,
    /// or with the list dropped entirely when `names` is `None`.
    pub fn relax_required(&self, names: Option<&[String]>) -> Result<Self> {
        let mut document = self.document.clone();
        if let Some(map) = document.as_object_mut() {
            match names {
                None => {
                    map.remove("required");
                }
                Some(names) => {
                    if let Some(Value::Array(required)) = map.get_mut("required") {
                        required.retain(|entry| {
                            entry
                                .as_str()
                                .map_or(true, |name| !names.iter().any(|n| n == name))
                        });
                    }
                }
            }
        }
        Self::compile(self.subject.clone(), document)
    }
}

fn collect_property_keys(schema: &Value, keys: &mut BTreeSet<String>) {
    match schema {
        Value::Object(map) => {
            if let Some(Value::Object(props)) = map.get("properties") {
                keys.extend(props.keys().cloned());
            }
            for inner in map.values() {
                collect_property_keys(inner, keys);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_property_keys(item, keys);
            }
        }
        _ => {}
    }
}

fn coerce(root: &Value, schema: &Value, value: &mut Value, indirection: usize) {
    if indirection > MAX_SCHEMA_INDIRECTION {
        return;
    }
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(target) = schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| resolve_ref(root, reference))
    {
        coerce(root, target, value, indirection + 1);
    }
    if let Some(Value::Array(all_of)) = schema.get("allOf") {
        for sub in all_of {
            coerce(root, sub, value, indirection + 1);
        }
    }

    let types = declared_types(schema);
    if !types.is_empty() {
        coerce_scalar(&types, value);
    }

    match value {
        Value::Object(map) => coerce_members(root, schema, map, indirection),
        Value::Array(items) => match schema.get("items") {
            Some(item_schema @ Value::Object(_)) => {
                for item in items.iter_mut() {
                    coerce(root, item_schema, item, indirection);
                }
            }
            Some(Value::Array(tuple)) => {
                for (item, item_schema) in items.iter_mut().zip(tuple) {
                    coerce(root, item_schema, item, indirection);
                }
            }
            _ => {}
        },
        _ => {}
    }
}

fn coerce_members(
    root: &Value,
    schema: &Map<String, Value>,
    map: &mut Map<String, Value>,
    indirection: usize,
) {
    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties").filter(|s| s.is_object());
    for (key, inner) in map.iter_mut() {
        if let Some(property) = properties.and_then(|props| props.get(key)) {
            coerce(root, property, inner, indirection);
        } else if let Some(additional) = additional {
            coerce(root, additional, inner, indirection);
        }
    }
}

fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        Some(root)
    } else {
        root.pointer(pointer)
    }
}

fn declared_types(schema: &Map<String, Value>) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(kind)) => vec![kind.as_str()],
        Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn matches_type(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value
            .as_f64()
            .is_some_and(|n| value.is_i64() || value.is_u64() || n.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn coerce_scalar(types: &[&str], value: &mut Value) {
    if types.iter().any(|kind| matches_type(kind, value)) {
        return;
    }
    for kind in types {
        if let Some(coerced) = coerce_to(kind, value) {
            *value = coerced;
            return;
        }
    }
}

fn coerce_to(kind: &str, value: &Value) -> Option<Value> {
    match (kind, value) {
        ("number", Value::String(s)) => parse_number(s),
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("number" | "integer", Value::Null) => Some(Value::from(0)),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("string", Value::Null) => Some(Value::String(String::new())),
        ("boolean", Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Number(n)) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(Value::Bool(true)),
            Some(x) if x == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Null) => Some(Value::Bool(false)),
        ("null", Value::String(s)) if s.is_empty() => Some(Value::Null),
        ("null", Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),
        ("null", Value::Bool(false)) => Some(Value::Null),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::from(int));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_schema() -> CompiledSchema {
        CompiledSchema::compile(
            "ResourceProperties",
            json!({
                "type": "object",
                "definitions": {
                    "Memo": {
                        "type": "object",
                        "properties": {
                            "Heading": {"type": "string"},
                            "Pages": {"type": "integer"}
                        },
                        "additionalProperties": false
                    }
                },
                "properties": {
                    "TPSCode": {"type": "string"},
                    "Title": {"type": "string"},
                    "Copies": {"type": "integer"},
                    "Draft": {"type": "boolean"},
                    "Multipliers": {"type": "array", "items": {"type": "number"}},
                    "Memo": {"$ref": "#/definitions/Memo"}
                },
                "required": ["Title", "TPSCode"]
            }),
        )
        .unwrap()
    }

    #[test]
    fn conforming_value_passes_unchanged() {
        let value = json!({"TPSCode": "1", "Title": "t", "Copies": 2});
        assert_eq!(report_schema().ensure(&value).unwrap(), value);
    }

    #[test]
    fn numeric_and_boolean_strings_are_coerced() {
        let value = json!({
            "TPSCode": 42,
            "Title": "t",
            "Copies": "3",
            "Draft": "true",
            "Multipliers": ["1.5", 2],
            "Memo": {"Pages": "12"}
        });
        let coerced = report_schema().ensure(&value).unwrap();
        assert_eq!(coerced["TPSCode"], json!("42"));
        assert_eq!(coerced["Copies"], json!(3));
        assert_eq!(coerced["Draft"], json!(true));
        assert_eq!(coerced["Multipliers"], json!([1.5, 2]));
        assert_eq!(coerced["Memo"]["Pages"], json!(12));
        // input untouched
        assert_eq!(value["Copies"], json!("3"));
    }

    #[test]
    fn non_conforming_value_is_rejected_with_explanation() {
        let value = json!({"TPSCode": "1", "Copies": "many"});
        let failure = report_schema().ensure(&value).unwrap_err();
        assert_eq!(failure.subject(), "ResourceProperties");
        assert!(failure.errors().len() >= 2);
        assert!(failure.explanation().contains("Title"));
    }

    #[test]
    fn nested_additional_properties_are_enforced() {
        let value = json!({"TPSCode": "1", "Title": "t", "Memo": {"Unexpected": 1}});
        assert!(report_schema().ensure(&value).is_err());
    }

    #[test]
    fn relaxing_required_drops_named_entries() {
        let relaxed = report_schema()
            .relax_required(Some(&["TPSCode".to_string()]))
            .unwrap();
        assert!(relaxed.ensure(&json!({"Title": "t"})).is_ok());
        assert!(relaxed.ensure(&json!({})).is_err());

        let open = report_schema().relax_required(None).unwrap();
        assert!(open.ensure(&json!({})).is_ok());
    }

    #[test]
    fn declared_keys_include_definitions() {
        let keys = report_schema().declared_keys();
        assert!(keys.contains("TPSCode"));
        assert!(keys.contains("Heading"));
        assert!(keys.contains("Pages"));
        assert_eq!(report_schema().top_level_properties().len(), 6);
    }

    #[test]
    fn empty_object_passes_open_schema() {
        let schema = CompiledSchema::any_object("TypeConfiguration").unwrap();
        assert_eq!(schema.ensure(&json!({})).unwrap(), json!({}));
        assert!(schema.ensure(&json!("nope")).is_err());
    }

    #[test]
    fn provider_meta_schema_is_ignored() {
        let schema = CompiledSchema::compile(
            "ResourceProperties",
            json!({
                "$schema": "https://schema.cloudformation.us-east-1.amazonaws.com/provider.definition.schema.v1.json",
                "type": "object"
            }),
        );
        assert!(schema.is_ok());
    }

    #[test]
    fn invalid_schema_is_configuration_error() {
        let err = CompiledSchema::compile("ResourceProperties", json!({"type": 12})).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }
}
