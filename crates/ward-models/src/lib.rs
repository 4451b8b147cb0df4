//! The clinical model tree.
//!
//! Client files are the top-level collection; progress notes and progress
//! events nest inside each client file. The store adds `id`, `revisionId`,
//! `timestamp`, `author`, and the ancestor id fields at registration, so
//! the schemas here declare only the domain fields.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use ward_store::{Field, ModelDef, Schema};

/// The full model tree to register with the store.
pub fn model_tree() -> Vec<ModelDef> {
    vec![client_file()]
}

/// The client file model: one per client, mutable, indexed by client name
/// and record id so the chart list renders without decrypting payloads.
pub fn client_file() -> ModelDef {
    let section = Schema::object([
        ("id", Field::required(Schema::Str)),
        ("name", Field::required(Schema::Str)),
        ("programId", Field::optional(Schema::Str)),
        ("status", Field::required(Schema::Str)),
        ("targets", Field::required(Schema::Array(Box::new(Schema::Str)))),
    ]);
    let plan = Schema::object([("sections", Field::required(Schema::Array(Box::new(section))))]);
    let client_name = Schema::object([
        ("first", Field::required(Schema::Str)),
        ("middle", Field::required(Schema::Str)),
        ("last", Field::required(Schema::Str)),
    ]);

    ModelDef {
        name: "clientFile".to_string(),
        collection_name: "clientFiles".to_string(),
        is_mutable: true,
        indexes: vec![
            vec!["clientName".to_string(), "first".to_string()],
            vec!["clientName".to_string(), "middle".to_string()],
            vec!["clientName".to_string(), "last".to_string()],
            vec!["recordId".to_string()],
        ],
        schema: Schema::object([
            ("clientName", Field::required(client_name)),
            ("recordId", Field::required(Schema::Str)),
            ("plan", Field::required(plan)),
        ]),
        children: vec![prog_note(), prog_event()],
    }
}

/// The progress note model: mutable, revisions accumulate as the note is
/// edited. `backdate` is a timestamp string or empty when the note is not
/// backdated.
pub fn prog_note() -> ModelDef {
    ModelDef {
        name: "progNote".to_string(),
        collection_name: "progNotes".to_string(),
        is_mutable: true,
        indexes: vec![],
        schema: Schema::object([
            ("type", Field::required(Schema::Str)),
            ("status", Field::required(Schema::Str)),
            ("notes", Field::required(Schema::Str)),
            ("backdate", Field::required(Schema::Timestamp)),
            ("summary", Field::optional(Schema::Str)),
        ]),
        children: vec![],
    }
}

/// The progress event model: immutable, written once.
pub fn prog_event() -> ModelDef {
    ModelDef {
        name: "progEvent".to_string(),
        collection_name: "progEvents".to_string(),
        is_mutable: false,
        indexes: vec![],
        schema: Schema::object([
            ("title", Field::required(Schema::Str)),
            ("description", Field::optional(Schema::Str)),
            ("startTimestamp", Field::required(Schema::Timestamp)),
            ("endTimestamp", Field::required(Schema::Timestamp)),
        ]),
        children: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_file_schema_accepts_minimal_chart() {
        let model = client_file();
        model
            .schema
            .validate(&json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []},
            }))
            .unwrap();
    }

    #[test]
    fn test_client_file_rejects_unknown_field() {
        assert!(client_file()
            .schema
            .validate(&json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []},
                "nickname": "A",
            }))
            .is_err());
    }

    #[test]
    fn test_prog_note_requires_status() {
        assert!(prog_note()
            .schema
            .validate(&json!({
                "type": "basic",
                "notes": "hello",
                "backdate": "",
            }))
            .is_err());
    }

    #[test]
    fn test_tree_shape() {
        let tree = model_tree();
        assert_eq!(tree.len(), 1);
        let children: Vec<&str> = tree[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, ["progNote", "progEvent"]);
        assert!(tree[0].is_mutable);
        assert!(!tree[0].children[1].is_mutable);
    }
}
