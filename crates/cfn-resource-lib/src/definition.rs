//! Immutable per-resource configuration.
//!
//! A [`ResourceDefinition`] is assembled once at provider construction and
//! shared by every invocation. All configuration errors (bad schemas,
//! undeclared identifiers) surface here rather than at dispatch time.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::case::CaseTransformer;
use crate::error::{Error, Result};
use crate::identifiers::PrimaryKeySet;
use crate::schema::CompiledSchema;

/// Schema keywords carried over from a resource schema document into the
/// properties validator.
const VALIDATION_KEYWORDS: [&str; 8] = [
    "properties",
    "definitions",
    "required",
    "additionalProperties",
    "allOf",
    "anyOf",
    "oneOf",
    "dependencies",
];

#[derive(Debug)]
pub struct ResourceDefinition {
    type_name: String,
    schema: CompiledSchema,
    create_schema: CompiledSchema,
    lookup_schema: CompiledSchema,
    type_configuration_schema: CompiledSchema,
    identifiers: PrimaryKeySet,
    casing: Arc<CaseTransformer>,
}

impl ResourceDefinition {
    /// Builds a definition from a properties schema and identifier names in
    /// wire casing.
    pub fn new<I, S>(type_name: impl Into<String>, properties_schema: Value, identifiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let type_name = type_name.into();
        let schema = CompiledSchema::compile("ResourceProperties", properties_schema)?;
        let type_configuration_schema = CompiledSchema::any_object("TypeConfiguration")?;
        let casing = Arc::new(casing_for(&schema, &type_configuration_schema));
        let identifiers = PrimaryKeySet::new(
            &type_name,
            identifiers,
            &schema.top_level_properties(),
            &casing,
        )?;

        let create_schema = schema.relax_required(Some(identifiers.wire_names()))?;
        let lookup_schema = schema.relax_required(None)?;

        Ok(Self {
            type_name,
            schema,
            create_schema,
            lookup_schema,
            type_configuration_schema,
            identifiers,
            casing,
        })
    }

    /// Builds a definition from a CloudFormation resource schema document.
    pub fn from_resource_schema(document: &Value) -> Result<Self> {
        let type_name = document
            .get("typeName")
            .and_then(Value::as_str)
            .ok_or(Error::MissingSchemaField { field: "typeName" })?;

        let pointers = document
            .get("primaryIdentifier")
            .and_then(Value::as_array)
            .ok_or(Error::MissingSchemaField {
                field: "primaryIdentifier",
            })?;
        let names =
            PrimaryKeySet::names_from_pointers(pointers.iter().filter_map(Value::as_str))?;

        let mut properties_schema = Map::new();
        properties_schema.insert("type".into(), Value::String("object".into()));
        for keyword in VALIDATION_KEYWORDS {
            if let Some(value) = document.get(keyword) {
                properties_schema.insert(keyword.to_string(), value.clone());
            }
        }

        let definition = Self::new(type_name, Value::Object(properties_schema), names)?;
        match document.get("typeConfiguration") {
            Some(type_configuration) => {
                definition.with_type_configuration_schema(type_configuration.clone())
            }
            None => Ok(definition),
        }
    }

    /// Replaces the default open type-configuration schema.
    ///
    /// The declared schema is honored as-is, including its `required` list.
    pub fn with_type_configuration_schema(mut self, schema: Value) -> Result<Self> {
        self.type_configuration_schema = CompiledSchema::compile("TypeConfiguration", schema)?;
        self.casing = Arc::new(casing_for(&self.schema, &self.type_configuration_schema));
        Ok(self)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Full resource schema, used for UPDATE and DELETE input and for
    /// re-validating outgoing models.
    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    /// Resource schema without identifier fields in `required`.
    pub fn create_schema(&self) -> &CompiledSchema {
        &self.create_schema
    }

    /// Resource schema without any top-level `required`, used for READ.
    pub fn lookup_schema(&self) -> &CompiledSchema {
        &self.lookup_schema
    }

    pub fn type_configuration_schema(&self) -> &CompiledSchema {
        &self.type_configuration_schema
    }

    pub fn identifiers(&self) -> &PrimaryKeySet {
        &self.identifiers
    }

    pub fn casing(&self) -> &Arc<CaseTransformer> {
        &self.casing
    }
}

fn casing_for(schema: &CompiledSchema, type_configuration: &CompiledSchema) -> CaseTransformer {
    let mut keys = schema.declared_keys();
    keys.extend(type_configuration.declared_keys());
    CaseTransformer::with_wire_keys(keys.iter().map(String::as_str))
}
