//! Structural schema validation.
//!
//! Model definitions declare the shape of their payloads; every write and
//! every read validates against the declared schema. Unknown fields are
//! rejected, optional fields are explicitly marked, and timestamp-typed
//! fields must parse in the store's sortable format (the empty string is
//! accepted and means "unset").

use std::collections::BTreeMap;

use serde_json::Value;
use ward_core::Timestamp;

use crate::StoreError;

/// The structural schema of a value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// A JSON object with a fixed field set
    Object(BTreeMap<String, Field>),
    /// Any string
    Str,
    /// A string in the sortable timestamp format, or empty
    Timestamp,
    /// A boolean
    Bool,
    /// A number
    Number,
    /// A homogeneous array
    Array(Box<Schema>),
}

/// One declared field of an object schema.
#[derive(Debug, Clone)]
pub struct Field {
    /// The field's value schema
    pub schema: Schema,
    /// Whether the field may be absent
    pub optional: bool,
}

impl Field {
    /// A field that must be present.
    pub fn required(schema: Schema) -> Self {
        Self {
            schema,
            optional: false,
        }
    }

    /// A field that may be absent.
    pub fn optional(schema: Schema) -> Self {
        Self {
            schema,
            optional: true,
        }
    }
}

impl Schema {
    /// Convenience constructor for object schemas.
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Field)>,
        S: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Validates a value, returning a dotted path to the first offending
    /// field on failure.
    pub fn validate(&self, value: &Value) -> Result<(), StoreError> {
        self.validate_at(value, &mut Vec::new())
    }

    fn validate_at(&self, value: &Value, path: &mut Vec<String>) -> Result<(), StoreError> {
        match self {
            Schema::Object(fields) => {
                let Some(map) = value.as_object() else {
                    return Err(type_error(path, "object"));
                };
                for key in map.keys() {
                    if !fields.contains_key(key) {
                        path.push(key.clone());
                        let err = StoreError::Validation(format!(
                            "unknown field: {}",
                            render_path(path)
                        ));
                        path.pop();
                        return Err(err);
                    }
                }
                for (name, field) in fields {
                    match map.get(name) {
                        Some(inner) => {
                            path.push(name.clone());
                            field.schema.validate_at(inner, path)?;
                            path.pop();
                        }
                        None if field.optional => {}
                        None => {
                            path.push(name.clone());
                            let err = StoreError::Validation(format!(
                                "missing required field: {}",
                                render_path(path)
                            ));
                            path.pop();
                            return Err(err);
                        }
                    }
                }
                Ok(())
            }
            Schema::Str => match value.as_str() {
                Some(_) => Ok(()),
                None => Err(type_error(path, "string")),
            },
            Schema::Timestamp => match value.as_str() {
                Some("") => Ok(()),
                Some(text) => Timestamp::parse_sortable(text).map(|_| ()).map_err(|_| {
                    StoreError::Validation(format!(
                        "field {} is not a valid timestamp",
                        render_path(path)
                    ))
                }),
                None => Err(type_error(path, "timestamp string")),
            },
            Schema::Bool => match value.as_bool() {
                Some(_) => Ok(()),
                None => Err(type_error(path, "boolean")),
            },
            Schema::Number => {
                if value.is_number() {
                    Ok(())
                } else {
                    Err(type_error(path, "number"))
                }
            }
            Schema::Array(inner) => {
                let Some(items) = value.as_array() else {
                    return Err(type_error(path, "array"));
                };
                for (i, item) in items.iter().enumerate() {
                    path.push(format!("[{i}]"));
                    inner.validate_at(item, path)?;
                    path.pop();
                }
                Ok(())
            }
        }
    }
}

fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

fn type_error(path: &[String], expected: &str) -> StoreError {
    StoreError::Validation(format!(
        "field {} must be a {expected}",
        render_path(path)
    ))
}
