//! Document, object, and template persistence.
//!
//! One JSON file per document under a root directory, written atomically
//! (temp file + rename). Saves are last-write-wins full overwrites: two
//! concurrent edits to the same id race, and the later save replaces the
//! earlier one entirely, including fields the second writer did not intend
//! to touch. There is no version counter guarding against this.
//!
//! Directory layout:
//! ```text
//! data_dir/
//!   proposals/
//!     prop-18f3a2-0001.json
//!   objects/
//!     attachments/
//!       call.pdf
//!       call.pdf.meta.json
//!   templates/
//!     horizon-ria.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::model::{Document, SectionNode};

/// Whether a caller-supplied id or object name is safe to use as a file
/// name component.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('.')
}

// ── DocumentStore ──────────────────────────────────────────────────

/// File-backed key/value store for proposal documents.
#[derive(Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Create a new store, ensuring the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Get the store's root directory.
    pub fn dir(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    /// Last write wins — no staleness check.
    pub fn save(&self, doc: &Document) -> Result<(), String> {
        if !valid_name(&doc.id) {
            return Err(format!("invalid document id: {:?}", doc.id));
        }
        let final_path = self.doc_path(&doc.id);
        let tmp_path = self.root.join(format!(".{}.json.tmp", doc.id));

        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| format!("failed to serialize document: {e}"))?;
        std::fs::write(&tmp_path, json).map_err(|e| format!("failed to write document: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("failed to rename document: {e}"))?;
        Ok(())
    }

    /// Load a document. Returns `None` when it doesn't exist.
    pub fn load(&self, id: &str) -> Result<Option<Document>, String> {
        if !valid_name(id) {
            return Ok(None);
        }
        let path = self.doc_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json =
            std::fs::read_to_string(&path).map_err(|e| format!("failed to read document: {e}"))?;
        let doc: Document =
            serde_json::from_str(&json).map_err(|e| format!("failed to parse document: {e}"))?;
        Ok(Some(doc))
    }

    /// Delete a document. Deleting a missing id is not an error.
    pub fn delete(&self, id: &str) -> Result<(), String> {
        if !valid_name(id) {
            return Ok(());
        }
        let path = self.doc_path(id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| format!("failed to delete document: {e}"))?;
        }
        Ok(())
    }

    /// List all documents whose id starts with `prefix` (empty prefix lists
    /// everything). Malformed files are skipped with a warning rather than
    /// failing the whole scan.
    pub fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<Document>, String> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| format!("failed to read store dir: {e}"))?;

        let mut docs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read entry: {e}"))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            if id.starts_with('.') || !id.starts_with(prefix) {
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(json) => match serde_json::from_str::<Document>(&json) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => {
                        warn!("skipping malformed document at {}: {e}", entry.path().display());
                    }
                },
                Err(e) => {
                    warn!("skipping unreadable document at {}: {e}", entry.path().display());
                }
            }
        }

        // Directory order is arbitrary; present newest first.
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }
}

// ── ObjectStore ────────────────────────────────────────────────────

/// Binary object storage by bucket and path, with a sidecar file carrying
/// the content type.
#[derive(Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

/// Listing entry for one stored object.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub path: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
}

impl ObjectStore {
    /// Create a new store, ensuring the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn object_path(&self, bucket: &str, path: &str) -> Option<PathBuf> {
        (valid_name(bucket) && valid_name(path)).then(|| self.root.join(bucket).join(path))
    }

    fn meta_path(&self, bucket: &str, path: &str) -> Option<PathBuf> {
        self.object_path(bucket, path)
            .map(|p| p.with_file_name(format!("{path}.meta.json")))
    }

    /// Store an object's bytes and content type.
    pub fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), String> {
        let object = self
            .object_path(bucket, path)
            .ok_or_else(|| format!("invalid object name: {bucket}/{path}"))?;
        let meta = object.with_file_name(format!("{path}.meta.json"));

        std::fs::create_dir_all(self.root.join(bucket))
            .map_err(|e| format!("failed to create bucket: {e}"))?;
        std::fs::write(&object, bytes).map_err(|e| format!("failed to write object: {e}"))?;
        let meta_json = serde_json::to_string(&ObjectMeta {
            content_type: content_type.to_string(),
        })
        .map_err(|e| format!("failed to serialize object meta: {e}"))?;
        std::fs::write(&meta, meta_json).map_err(|e| format!("failed to write object meta: {e}"))?;
        Ok(())
    }

    /// Fetch an object's bytes and content type. `None` when absent.
    pub fn download(&self, bucket: &str, path: &str) -> Result<Option<(Vec<u8>, String)>, String> {
        let Some(object) = self.object_path(bucket, path) else {
            return Ok(None);
        };
        if !object.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&object).map_err(|e| format!("failed to read object: {e}"))?;
        let content_type = self
            .meta_path(bucket, path)
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|json| serde_json::from_str::<ObjectMeta>(&json).ok())
            .map(|m| m.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Some((bytes, content_type)))
    }

    /// List the objects in a bucket. Missing buckets list as empty.
    pub fn list(&self, bucket: &str) -> Result<Vec<ObjectEntry>, String> {
        if !valid_name(bucket) {
            return Ok(Vec::new());
        }
        let dir = self.root.join(bucket);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&dir).map_err(|e| format!("failed to read bucket: {e}"))?;

        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read entry: {e}"))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".meta.json") {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let content_type = self
                .download_meta(bucket, &name)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            objects.push(ObjectEntry {
                path: name,
                size,
                content_type,
            });
        }
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    fn download_meta(&self, bucket: &str, path: &str) -> Option<String> {
        let meta = self.meta_path(bucket, path)?;
        let json = std::fs::read_to_string(meta).ok()?;
        serde_json::from_str::<ObjectMeta>(&json)
            .ok()
            .map(|m| m.content_type)
    }
}

// ── Templates ──────────────────────────────────────────────────────

/// Load a section template by id from a templates directory
/// (`{dir}/{id}.json` holding a `Vec<SectionNode>` forest). `None` when the
/// file doesn't exist.
pub fn load_template(dir: &Path, id: &str) -> Result<Option<Vec<SectionNode>>, String> {
    if !valid_name(id) {
        return Ok(None);
    }
    let path = dir.join(format!("{id}.json"));
    if !path.exists() {
        return Ok(None);
    }
    let json =
        std::fs::read_to_string(&path).map_err(|e| format!("failed to read template: {e}"))?;
    let template: Vec<SectionNode> =
        serde_json::from_str(&json).map_err(|e| format!("failed to parse template: {e}"))?;
    Ok(Some(template))
}
