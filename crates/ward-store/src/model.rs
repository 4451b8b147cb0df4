//! Model definitions.
//!
//! A model fixes a collection's name, mutability, indexed field paths, and
//! payload schema. Children form a tree: each child collection lives
//! physically inside each parent object's directory. At `Store::open` the
//! declared schema is augmented with the metadata fields every stored
//! object carries.

use std::collections::BTreeMap;

use crate::schema::{Field, Schema};
use crate::StoreError;

/// Metadata fields stamped onto every stored object.
pub const METADATA_FIELDS: [&str; 4] = ["id", "revisionId", "timestamp", "author"];

/// Definition of one model in the collection tree.
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Model name, unique across the tree (e.g. `clientFile`)
    pub name: String,
    /// Physical collection directory name (e.g. `clientFiles`)
    pub collection_name: String,
    /// Whether objects accumulate revisions (`true`) or are written once
    pub is_mutable: bool,
    /// Indexed field paths, queryable via `list` without decrypting payloads
    pub indexes: Vec<Vec<String>>,
    /// Structural schema of the payload (must be an object schema)
    pub schema: Schema,
    /// Child models whose collections nest inside each object
    pub children: Vec<ModelDef>,
}

impl ModelDef {
    /// Returns the name of the id field a descendant payload carries for
    /// this ancestor (e.g. `clientFileId`).
    pub fn ancestor_id_field(&self) -> String {
        format!("{}Id", self.name)
    }
}

/// Builds the runtime schema for a model at its position in the tree:
/// the declared fields plus `id`, `revisionId`, `timestamp`, `author`, and
/// one `<ancestorName>Id` per ancestor.
pub(crate) fn augmented_schema(
    model: &ModelDef,
    ancestors: &[ModelDef],
) -> Result<Schema, StoreError> {
    let Schema::Object(declared) = &model.schema else {
        return Err(StoreError::Validation(format!(
            "model {} schema must be an object schema",
            model.name
        )));
    };

    let mut fields: BTreeMap<String, Field> = declared.clone();
    let mut add = |name: String, field: Field| -> Result<(), StoreError> {
        if fields.insert(name.clone(), field).is_some() {
            return Err(StoreError::Validation(format!(
                "model {} declares reserved field {name}",
                model.name
            )));
        }
        Ok(())
    };

    add("id".into(), Field::required(Schema::Str))?;
    add("revisionId".into(), Field::required(Schema::Str))?;
    add("timestamp".into(), Field::required(Schema::Timestamp))?;
    add("author".into(), Field::required(Schema::Str))?;
    for ancestor in ancestors {
        add(ancestor.ancestor_id_field(), Field::required(Schema::Str))?;
    }

    Ok(Schema::Object(fields))
}
