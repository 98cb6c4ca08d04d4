//! JSON-backed metadata store, one document per flipbook name.
//!
//! The document maps a version basename (`turnaround_v001`) to its
//! [`VersionAttrs`]. It is read once at construction and rewritten in full on
//! every mutation via write-temp-then-rename. There is no locking: two writers
//! on the same document lose updates, last writer wins.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::entities::{VersionAttrs, VersionKey};
use crate::error::{FlipbookError, Result};

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    data: IndexMap<String, VersionAttrs>,
}

impl MetadataStore {
    /// Load the document at `path`. Missing or malformed documents start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<IndexMap<String, VersionAttrs>>(&text) {
                Ok(data) => {
                    debug!("Loaded {} entries from {}", data.len(), path.display());
                    data
                }
                Err(e) => {
                    warn!("Ignoring malformed metadata {}: {}", path.display(), e);
                    IndexMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => {
                warn!("Cannot read metadata {}: {}", path.display(), e);
                IndexMap::new()
            }
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, key: &VersionKey) -> bool {
        self.data.contains_key(&key.to_string())
    }

    /// Stored attributes, or an empty record for unknown keys.
    pub fn get(&self, key: &VersionKey) -> VersionAttrs {
        self.data.get(&key.to_string()).cloned().unwrap_or_default()
    }

    /// Upsert and persist. Creates the directory and file as needed.
    pub fn put(&mut self, key: &VersionKey, attrs: VersionAttrs) -> Result<()> {
        self.data.insert(key.to_string(), attrs);
        self.persist()
    }

    /// Upsert in memory only; follow with [`persist`](Self::persist).
    pub fn stage(&mut self, key: &VersionKey, attrs: VersionAttrs) {
        self.data.insert(key.to_string(), attrs);
    }

    /// Drop and persist. Absent keys are a no-op.
    pub fn remove(&mut self, key: &VersionKey) -> Result<()> {
        if self.data.shift_remove(&key.to_string()).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Import `<key>.txt` from the version directory as the comment, once.
    ///
    /// Returns true if the attributes changed. Nothing is written to disk here;
    /// the caller persists together with its own updates.
    pub fn migrate_legacy_comment(&mut self, key: &VersionKey, version_dir: &Path) -> bool {
        let legacy = version_dir.join(format!("{}.txt", key));
        let entry = self.data.entry(key.to_string()).or_default();
        if entry.comment_imported || entry.comment.is_some() || !legacy.is_file() {
            return false;
        }
        match fs::read_to_string(&legacy) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    entry.comment = Some(text.to_string());
                }
                entry.comment_imported = true;
                info!("Imported legacy comment for {} from {}", key, legacy.display());
                true
            }
            Err(e) => {
                warn!("Cannot read legacy comment {}: {}", legacy.display(), e);
                false
            }
        }
    }

    /// Rewrite the whole document.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.data).map_err(|e| FlipbookError::Json {
            context: format!("serialize {}", self.path.display()),
            source: e,
        })?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Wrote {} entries to {}", self.data.len(), self.path.display());
        Ok(())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FlipbookError::io("create", parent, e))?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, bytes).map_err(|e| FlipbookError::io("write", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        fs::remove_file(&tmp).ok();
        return Err(FlipbookError::io("rename into", path, e));
    }
    Ok(())
}
