//! The collection engine.
//!
//! For each model in the registered tree the engine exposes the collection
//! operations: `create`, `list`, `read` (immutable collections),
//! `create_revision` and the revision readers (mutable collections). Objects
//! live as encrypted directories whose names encode the indexed field values
//! plus the id, so `list` answers indexed queries without decrypting a
//! single payload. Child collections nest physically inside each parent
//! object's directory.
//!
//! Every payload embeds the collection path it was written at; every read
//! re-checks that context against the physical location the file was found
//! at. Moving a ciphertext between locations is detected even though the
//! filename layer itself is only weakly protected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use ward_core::codec;
use ward_core::crypto::{self, CryptoError, FilenameCipher};
use ward_core::{ObjectId, RevisionId, Timestamp};

use crate::config::TMP_DIR;
use crate::events::StoreEvent;
use crate::fsx;
use crate::model::{augmented_schema, ModelDef, METADATA_FIELDS};
use crate::schema::Schema;
use crate::session::Session;
use crate::StoreError;

/// Security level of the filename cipher (bytes of deterministic-cipher
/// overhead per name).
const FILENAME_SECURITY_LEVEL: u8 = 5;

const CTX_COLLECTION_NAMES: &str = "_contextCollectionNames";
const CTX_IDS: &str = "_contextIds";
const COLLECTION_NAME: &str = "_collectionName";

struct Shared {
    session: Session,
    cipher: FilenameCipher,
    tmp_root: PathBuf,
}

struct AncestorSpec {
    name: String,
    collection_name: String,
    index_count: usize,
    id_field: String,
}

struct CollectionSpec {
    model: ModelDef,
    ancestors: Vec<AncestorSpec>,
    schema: Schema,
}

/// The opened store: one [`Collection`] handle per registered model.
pub struct Store {
    shared: Arc<Shared>,
    specs: HashMap<String, Arc<CollectionSpec>>,
}

impl Store {
    /// Opens the store for a session over the given model tree. Schemas are
    /// augmented with the metadata fields here; model names must be unique
    /// across the whole tree.
    pub fn open(session: Session, models: Vec<ModelDef>) -> Result<Store, StoreError> {
        let cipher = FilenameCipher::new(session.key(), FILENAME_SECURITY_LEVEL);
        let tmp_root = session.data_dir().join(TMP_DIR);

        let mut specs = HashMap::new();
        for model in &models {
            register(model, &[], &mut specs)?;
        }

        Ok(Store {
            shared: Arc::new(Shared {
                session,
                cipher,
                tmp_root,
            }),
            specs,
        })
    }

    /// Returns the collection handle for a model name, if registered.
    pub fn collection(&self, model_name: &str) -> Option<Collection> {
        self.specs.get(model_name).map(|spec| Collection {
            shared: Arc::clone(&self.shared),
            spec: Arc::clone(spec),
        })
    }

    /// The session this store was opened with.
    pub fn session(&self) -> &Session {
        &self.shared.session
    }
}

fn register(
    model: &ModelDef,
    ancestors: &[ModelDef],
    specs: &mut HashMap<String, Arc<CollectionSpec>>,
) -> Result<(), StoreError> {
    let schema = augmented_schema(model, ancestors)?;
    let spec = CollectionSpec {
        model: model.clone(),
        ancestors: ancestors
            .iter()
            .map(|a| AncestorSpec {
                name: a.name.clone(),
                collection_name: a.collection_name.clone(),
                index_count: a.indexes.len(),
                id_field: a.ancestor_id_field(),
            })
            .collect(),
        schema,
    };
    if specs.insert(model.name.clone(), Arc::new(spec)).is_some() {
        return Err(StoreError::Validation(format!(
            "duplicate model name: {}",
            model.name
        )));
    }

    let mut chain = ancestors.to_vec();
    chain.push(model.clone());
    for child in &model.children {
        register(child, &chain, specs)?;
    }
    Ok(())
}

/// One entry from an indexed `list` query: the id and the indexed field
/// values, decoded from the directory name alone.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// The object's id
    pub id: ObjectId,
    /// Indexed field values bound to their declared paths
    pub fields: Map<String, Value>,
    /// Physical object directory (internal; used by the read paths)
    pub dir_path: PathBuf,
}

impl ListEntry {
    /// Looks up an indexed field value by dotted path.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut current = self.fields.get(path.split('.').next()?)?;
        for segment in path.split('.').skip(1) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// One entry from `list_revisions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    /// When the revision was written
    pub timestamp: Timestamp,
    /// The revision's id
    pub revision_id: RevisionId,
}

struct RevisionFile {
    timestamp: Timestamp,
    revision_id: RevisionId,
    enc_name: String,
}

/// Handle to one collection of the model tree.
pub struct Collection {
    shared: Arc<Shared>,
    spec: Arc<CollectionSpec>,
}

impl Collection {
    /// The model this collection stores.
    pub fn model_name(&self) -> &str {
        &self.spec.model.name
    }

    /// Creates a new object.
    ///
    /// The payload must not carry any store-assigned metadata field; for a
    /// nested collection it must carry the `<ancestorName>Id` fields that
    /// place it in the tree. Returns the object including its metadata.
    pub async fn create(&self, obj: Value) -> Result<Value, StoreError> {
        let Value::Object(mut map) = obj else {
            return Err(StoreError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        };
        for field in METADATA_FIELDS {
            if map.contains_key(field) {
                return Err(StoreError::Validation(format!(
                    "field {field} is assigned by the store"
                )));
            }
        }

        let id = ObjectId::random();
        let revision_id = RevisionId::random();
        let timestamp = Timestamp::now();
        map.insert("id".to_string(), Value::String(id.to_base64url()));
        map.insert(
            "revisionId".to_string(),
            Value::String(revision_id.to_base64url()),
        );
        map.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_sortable()),
        );
        map.insert(
            "author".to_string(),
            Value::String(self.shared.session.user_name().to_string()),
        );

        let contextual_ids = self.contextual_ids_from(&map)?;

        let value = Value::Object(map);
        self.spec.schema.validate(&value)?;
        let Value::Object(map) = value else {
            return Err(StoreError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        };

        let ids_ref: Vec<&str> = contextual_ids.iter().map(String::as_str).collect();
        let col_dir = self.resolve_collection_dir(&ids_ref).await?;

        let index_values = self.index_values(&map)?;
        let iv_ref: Vec<&str> = index_values.iter().map(String::as_str).collect();
        let dir_name = self
            .shared
            .cipher
            .encrypt_to_name(&codec::encode_object_dir_name(&iv_ref, &id));

        let staged = fsx::stage_directory(&self.shared.tmp_root).await?;
        for child in &self.spec.model.children {
            tokio::fs::create_dir(staged.path().join(&child.collection_name)).await?;
        }
        let rev_name = self
            .shared
            .cipher
            .encrypt_to_name(&codec::encode_revision_file_name(&timestamp, &revision_id));
        let sealed = self.seal_payload(&map, &contextual_ids)?;
        tokio::fs::write(staged.path().join(&rev_name), sealed).await?;

        match staged.commit(&col_dir.join(&dir_name)).await {
            Ok(()) => {}
            Err(fsx::CommitError::Collision) => {
                return Err(StoreError::Integrity(format!(
                    "object directory for {id} already exists"
                )))
            }
            Err(fsx::CommitError::Io(e)) => return Err(e.into()),
        }

        debug!(model = %self.spec.model.name, %id, "created object");
        let result = Value::Object(map);
        self.shared.session.bus().emit(StoreEvent::Created {
            model: self.spec.model.name.clone(),
            object: result.clone(),
        });
        Ok(result)
    }

    /// Lists the collection at the given context: id plus indexed field
    /// values per object, decoded from directory names. No payload is
    /// decrypted; names that do not decrypt or decode are skipped.
    pub async fn list(&self, contextual_ids: &[&str]) -> Result<Vec<ListEntry>, StoreError> {
        let col_dir = self.resolve_collection_dir(contextual_ids).await?;
        let mut entries = Vec::new();
        for entry in fsx::scan_dir(&col_dir).await? {
            if !entry.is_dir {
                continue;
            }
            let Ok(plain) = self.shared.cipher.decrypt_name(&entry.name) else {
                debug!(name = %entry.name, "skipping undecryptable directory name");
                continue;
            };
            let Ok(decoded) = codec::decode_object_dir_name(&plain, self.spec.model.indexes.len())
            else {
                debug!(name = %entry.name, "skipping undecodable directory name");
                continue;
            };

            let mut fields = Map::new();
            for (path, value) in self.spec.model.indexes.iter().zip(decoded.index_values) {
                insert_path(&mut fields, path, Value::String(value));
            }
            entries.push(ListEntry {
                id: decoded.id,
                fields,
                dir_path: col_dir.join(&entry.name),
            });
        }
        Ok(entries)
    }

    /// Reads an immutable object: its single revision, verified and
    /// validated. More than one revision file in the directory is an
    /// integrity failure.
    pub async fn read(&self, contextual_ids: &[&str], id: &str) -> Result<Value, StoreError> {
        if self.spec.model.is_mutable {
            return Err(StoreError::UnsupportedOperation(
                "read is only available on immutable collections",
            ));
        }
        let dir = self.lookup_obj_dir_by_id(contextual_ids, id).await?;
        let revisions = self.scan_revisions(&dir).await?;
        match revisions.as_slice() {
            [] => Err(StoreError::Integrity(format!(
                "object {id} has no revision file"
            ))),
            [only] => self.read_revision_file(&dir, only, contextual_ids, id).await,
            more => Err(StoreError::Integrity(format!(
                "immutable object {id} has {} revision files",
                more.len()
            ))),
        }
    }

    /// Writes a new revision of an existing mutable object. When an indexed
    /// field changed, the object directory is renamed to its new canonical
    /// name. Returns the revision including its metadata.
    pub async fn create_revision(&self, obj: Value) -> Result<Value, StoreError> {
        if !self.spec.model.is_mutable {
            return Err(StoreError::UnsupportedOperation(
                "createRevision is only available on mutable collections",
            ));
        }
        let Value::Object(mut map) = obj else {
            return Err(StoreError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        };
        let id = map
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Validation("id is required to create a revision".to_string()))?;
        let object_id = ObjectId::from_base64url(&id)
            .map_err(|_| StoreError::Validation(format!("id is not a valid identifier: {id}")))?;

        let revision_id = RevisionId::random();
        let timestamp = Timestamp::now();
        map.insert(
            "revisionId".to_string(),
            Value::String(revision_id.to_base64url()),
        );
        map.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_sortable()),
        );
        map.insert(
            "author".to_string(),
            Value::String(self.shared.session.user_name().to_string()),
        );

        let contextual_ids = self.contextual_ids_from(&map)?;

        let value = Value::Object(map);
        self.spec.schema.validate(&value)?;
        let Value::Object(map) = value else {
            return Err(StoreError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        };

        let ids_ref: Vec<&str> = contextual_ids.iter().map(String::as_str).collect();
        let dir = self.lookup_obj_dir_by_id(&ids_ref, &id).await?;

        let rev_name = self
            .shared
            .cipher
            .encrypt_to_name(&codec::encode_revision_file_name(&timestamp, &revision_id));
        let sealed = self.seal_payload(&map, &contextual_ids)?;
        fsx::write_buffer_to_file(&dir.join(&rev_name), &self.shared.tmp_root, &sealed).await?;

        // the directory name is derived from the indexed fields; keep it canonical
        let index_values = self.index_values(&map)?;
        let iv_ref: Vec<&str> = index_values.iter().map(String::as_str).collect();
        let new_plain = codec::encode_object_dir_name(&iv_ref, &object_id);
        let current_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::Integrity("object directory name is not UTF-8".to_string()))?;
        let current_plain = self.shared.cipher.decrypt_name(current_name)?;
        if new_plain != current_plain {
            let parent = dir
                .parent()
                .ok_or_else(|| StoreError::Integrity("object directory has no parent".to_string()))?;
            let new_dir = parent.join(self.shared.cipher.encrypt_to_name(&new_plain));
            tokio::fs::rename(&dir, &new_dir).await?;
            debug!(model = %self.spec.model.name, %object_id, "renamed object directory for updated index values");
        }

        debug!(model = %self.spec.model.name, %object_id, %revision_id, "created revision");
        let result = Value::Object(map);
        self.shared.session.bus().emit(StoreEvent::RevisionCreated {
            model: self.spec.model.name.clone(),
            object: result.clone(),
        });
        Ok(result)
    }

    /// Lists an object's revisions, ascending by timestamp. Decodes
    /// filenames only; no payload is decrypted.
    pub async fn list_revisions(
        &self,
        contextual_ids: &[&str],
        id: &str,
    ) -> Result<Vec<RevisionEntry>, StoreError> {
        let dir = self.lookup_obj_dir_by_id(contextual_ids, id).await?;
        Ok(self
            .scan_revisions(&dir)
            .await?
            .into_iter()
            .map(|r| RevisionEntry {
                timestamp: r.timestamp,
                revision_id: r.revision_id,
            })
            .collect())
    }

    /// Reads every revision of an object, ascending by timestamp.
    pub async fn read_revisions(
        &self,
        contextual_ids: &[&str],
        id: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let dir = self.lookup_obj_dir_by_id(contextual_ids, id).await?;
        let revisions = self.scan_revisions(&dir).await?;
        let mut out = Vec::with_capacity(revisions.len());
        for revision in &revisions {
            out.push(
                self.read_revision_file(&dir, revision, contextual_ids, id)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Reads the newest `count` revisions, ascending by timestamp. The
    /// object directory is resolved even for `count == 0` (a nonexistent
    /// object errors regardless), but nothing is decrypted in that case.
    pub async fn read_latest_revisions(
        &self,
        contextual_ids: &[&str],
        id: &str,
        count: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let dir = self.lookup_obj_dir_by_id(contextual_ids, id).await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let revisions = self.scan_revisions(&dir).await?;
        let skip = revisions.len().saturating_sub(count);
        let mut out = Vec::with_capacity(revisions.len() - skip);
        for revision in &revisions[skip..] {
            out.push(
                self.read_revision_file(&dir, revision, contextual_ids, id)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Extracts the ancestor ids that place a payload in the tree.
    fn contextual_ids_from(&self, map: &Map<String, Value>) -> Result<Vec<String>, StoreError> {
        self.spec
            .ancestors
            .iter()
            .map(|ancestor| {
                map.get(&ancestor.id_field)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        StoreError::Validation(format!(
                            "missing ancestor id field: {}",
                            ancestor.id_field
                        ))
                    })
            })
            .collect()
    }

    /// Extracts the declared indexed field values; each must be a string.
    fn index_values(&self, map: &Map<String, Value>) -> Result<Vec<String>, StoreError> {
        self.spec
            .model
            .indexes
            .iter()
            .map(|path| {
                lookup_path(map, path)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        StoreError::Validation(format!(
                            "indexed field {} must be a string",
                            path.join(".")
                        ))
                    })
            })
            .collect()
    }

    /// Walks the ancestor chain to the physical collection directory for
    /// the given context.
    async fn resolve_collection_dir(
        &self,
        contextual_ids: &[&str],
    ) -> Result<PathBuf, StoreError> {
        if contextual_ids.len() != self.spec.ancestors.len() {
            return Err(StoreError::Validation(format!(
                "expected {} contextual ids, got {}",
                self.spec.ancestors.len(),
                contextual_ids.len()
            )));
        }
        let mut dir = self.shared.session.data_dir().to_path_buf();
        for (ancestor, id) in self.spec.ancestors.iter().zip(contextual_ids) {
            let col_dir = dir.join(&ancestor.collection_name);
            dir = self
                .find_object_dir(&col_dir, &ancestor.name, ancestor.index_count, id)
                .await?;
        }
        Ok(dir.join(&self.spec.model.collection_name))
    }

    /// Locates one object directory inside a collection directory by id.
    async fn find_object_dir(
        &self,
        col_dir: &Path,
        model_name: &str,
        index_count: usize,
        id: &str,
    ) -> Result<PathBuf, StoreError> {
        for entry in fsx::scan_dir(col_dir).await? {
            if !entry.is_dir {
                continue;
            }
            let Ok(plain) = self.shared.cipher.decrypt_name(&entry.name) else {
                continue;
            };
            let Ok(decoded) = codec::decode_object_dir_name(&plain, index_count) else {
                continue;
            };
            if decoded.id.to_base64url() == id {
                return Ok(col_dir.join(&entry.name));
            }
        }
        Err(StoreError::ObjectNotFound {
            model: model_name.to_string(),
            id: id.to_string(),
        })
    }

    async fn lookup_obj_dir_by_id(
        &self,
        contextual_ids: &[&str],
        id: &str,
    ) -> Result<PathBuf, StoreError> {
        let col_dir = self.resolve_collection_dir(contextual_ids).await?;
        self.find_object_dir(
            &col_dir,
            &self.spec.model.name,
            self.spec.model.indexes.len(),
            id,
        )
        .await
    }

    /// Scans an object directory for revision files, ascending by
    /// timestamp. Child collection subdirectories and foreign files are
    /// filtered out.
    async fn scan_revisions(&self, dir: &Path) -> Result<Vec<RevisionFile>, StoreError> {
        let mut revisions = Vec::new();
        for entry in fsx::scan_dir(dir).await? {
            if entry.is_dir {
                continue;
            }
            let Ok(plain) = self.shared.cipher.decrypt_name(&entry.name) else {
                continue;
            };
            let Ok(decoded) = codec::decode_revision_file_name(&plain) else {
                continue;
            };
            revisions.push(RevisionFile {
                timestamp: decoded.timestamp,
                revision_id: decoded.revision_id,
                enc_name: entry.name,
            });
        }
        revisions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.revision_id.cmp(&b.revision_id))
        });
        Ok(revisions)
    }

    async fn read_revision_file(
        &self,
        dir: &Path,
        revision: &RevisionFile,
        contextual_ids: &[&str],
        id: &str,
    ) -> Result<Value, StoreError> {
        let sealed = tokio::fs::read(dir.join(&revision.enc_name)).await?;
        self.open_payload(&sealed, contextual_ids, id)
    }

    /// Annotates a payload with its collection context and seals it.
    fn seal_payload(
        &self,
        map: &Map<String, Value>,
        contextual_ids: &[String],
    ) -> Result<Vec<u8>, StoreError> {
        let mut payload = map.clone();
        payload.insert(
            CTX_COLLECTION_NAMES.to_string(),
            Value::Array(
                self.spec
                    .ancestors
                    .iter()
                    .map(|a| Value::String(a.collection_name.clone()))
                    .collect(),
            ),
        );
        payload.insert(
            CTX_IDS.to_string(),
            Value::Array(
                contextual_ids
                    .iter()
                    .map(|id| Value::String(id.clone()))
                    .collect(),
            ),
        );
        payload.insert(
            COLLECTION_NAME.to_string(),
            Value::String(self.spec.model.collection_name.clone()),
        );
        let bytes = serde_json::to_vec(&Value::Object(payload))?;
        Ok(crypto::seal(self.shared.session.key().as_bytes(), &bytes)?)
    }

    /// Opens a sealed payload and asserts that the embedded context matches
    /// the location it was read from. Any mismatch means the ciphertext was
    /// moved and is fatal.
    fn open_payload(
        &self,
        sealed: &[u8],
        contextual_ids: &[&str],
        expected_id: &str,
    ) -> Result<Value, StoreError> {
        let bytes = match crypto::open(self.shared.session.key().as_bytes(), sealed) {
            Ok(bytes) => bytes,
            Err(CryptoError::OpenFailed) | Err(CryptoError::TooShort(_)) => {
                return Err(StoreError::Integrity(
                    "payload authentication failed".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        let Value::Object(mut map) = value else {
            return Err(StoreError::Integrity(
                "payload is not a JSON object".to_string(),
            ));
        };

        let expected_names: Vec<Value> = self
            .spec
            .ancestors
            .iter()
            .map(|a| Value::String(a.collection_name.clone()))
            .collect();
        match map.remove(CTX_COLLECTION_NAMES) {
            Some(Value::Array(names)) if names == expected_names => {}
            _ => {
                return Err(StoreError::Integrity(
                    "payload context collection names do not match its location".to_string(),
                ))
            }
        }

        let expected_ids: Vec<Value> = contextual_ids
            .iter()
            .map(|id| Value::String((*id).to_string()))
            .collect();
        match map.remove(CTX_IDS) {
            Some(Value::Array(ids)) if ids == expected_ids => {}
            _ => {
                return Err(StoreError::Integrity(
                    "payload context ids do not match its location".to_string(),
                ))
            }
        }

        match map.remove(COLLECTION_NAME) {
            Some(Value::String(name)) if name == self.spec.model.collection_name => {}
            _ => {
                return Err(StoreError::Integrity(
                    "payload collection name does not match its location".to_string(),
                ))
            }
        }

        match map.get("id").and_then(Value::as_str) {
            Some(id) if id == expected_id => {}
            _ => {
                return Err(StoreError::Integrity(
                    "payload id does not match its directory".to_string(),
                ))
            }
        }

        let value = Value::Object(map);
        self.spec.schema.validate(&value)?;
        Ok(value)
    }
}

/// Looks up a nested value by path segments.
fn lookup_path<'a>(map: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Inserts a value at a nested path, creating intermediate objects.
fn insert_path(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = map;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(next) = entry.as_object_mut() else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}
