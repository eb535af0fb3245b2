//! Adapter payload validation.
//!
//! Validates the raw JSON payloads adapters hand back before any field is
//! trusted:
//! - payload must be a JSON object
//! - required fields must be present
//! - declared fields must match a coarse type when present
//!
//! Deliberately minimal: no nested schemas, enums, or pattern matching.
//! Anything beyond the required skeleton is the adapter's business.

use serde_json::Value;

use crate::errors::FetchError;

/// Coarse JSON type for a declared field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    /// A JSON string.
    String,
    /// A JSON number; `nullable` also admits an explicit null.
    Number { nullable: bool },
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number { nullable } => value.is_number() || (*nullable && value.is_null()),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number { .. } => "number",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// A declarative payload schema.
///
/// `properties` is ordered so validation reports issues in declaration
/// order; fields not listed there pass untouched.
#[derive(Clone, Debug)]
pub struct Schema {
    /// Fields that must be present (a null value counts as present).
    pub required: Vec<&'static str>,
    /// Type checks applied to fields when they are present.
    pub properties: Vec<(&'static str, FieldType)>,
}

/// Structural validator for adapter payloads.
pub struct SchemaValidator {
    schema: Schema,
}

impl SchemaValidator {
    /// Validator for the standard adapter response contract.
    pub fn adapter_response() -> Self {
        Self::with_schema(Schema {
            required: vec!["company_id", "metric", "source_id", "fetched_at"],
            properties: vec![
                ("company_id", FieldType::String),
                ("metric", FieldType::String),
                ("source_id", FieldType::String),
                ("fetched_at", FieldType::String),
                ("raw_value", FieldType::Number { nullable: true }),
                ("raw_units", FieldType::String),
                ("raw_currency", FieldType::String),
                ("reported_at", FieldType::String),
                ("meta", FieldType::Object),
            ],
        })
    }

    /// Validator for a custom schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self { schema }
    }

    /// Validate a payload.
    ///
    /// Returns `Ok(())` when the payload satisfies the schema, otherwise a
    /// [`FetchError::ValidationFailed`] listing every issue found.
    pub fn validate(&self, payload: &Value) -> Result<(), FetchError> {
        let Some(object) = payload.as_object() else {
            return Err(FetchError::ValidationFailed {
                message: "Payload must be a JSON object".to_string(),
            });
        };

        let mut issues: Vec<String> = Vec::new();

        for field in &self.schema.required {
            if !object.contains_key(*field) {
                issues.push(format!("Missing required field: {}", field));
            }
        }

        for (field, field_type) in &self.schema.properties {
            if let Some(value) = object.get(*field) {
                if !field_type.matches(value) {
                    issues.push(format!("Field {} must be {}", field, field_type.name()));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(FetchError::ValidationFailed {
                message: issues.join("; "),
            })
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::adapter_response()
    }
}
