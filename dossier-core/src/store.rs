//! Object store — instruction documents and generated reports.
//!
//! The store is an opaque collaborator: folders of named text objects with
//! creation times. Listing order proxies creation time (oldest first), which
//! is what gives the queue its FIFO behavior. `FsStore` implements the
//! contract over local directories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StoreError;

/// A stored object as seen in a folder listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Opaque object identifier, usable with `read` and `move_object`.
    pub id: String,
    /// Object name within its folder.
    pub name: String,
    /// Creation time reported by the store.
    pub created_time: DateTime<Utc>,
}

/// The external object store collaborator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List a folder's objects, oldest first.
    async fn list(&self, folder: &Path) -> Result<Vec<ObjectEntry>, StoreError>;

    /// Read an object's text content.
    async fn read(&self, id: &str) -> Result<String, StoreError>;

    /// Write a new object; returns its id.
    async fn write(&self, folder: &Path, name: &str, content: &str) -> Result<String, StoreError>;

    /// Move an object between folders.
    async fn move_object(&self, id: &str, to_folder: &Path) -> Result<(), StoreError>;
}

/// Local-filesystem object store: a folder is a directory, an object is a
/// file, and the object id is the file path.
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn created_time(path: &Path) -> DateTime<Utc> {
    // Some filesystems do not report a birth time; fall back to mtime.
    let meta = std::fs::metadata(path).ok();
    let system_time = meta
        .as_ref()
        .and_then(|m| m.created().or_else(|_| m.modified()).ok())
        .unwrap_or(std::time::UNIX_EPOCH);
    DateTime::<Utc>::from(system_time)
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list(&self, folder: &Path) -> Result<Vec<ObjectEntry>, StoreError> {
        let mut dir = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| StoreError::ListFailed {
                folder: folder.display().to_string(),
                message: e.to_string(),
            })?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| StoreError::ListFailed {
            folder: folder.display().to_string(),
            message: e.to_string(),
        })? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(ObjectEntry {
                id: path.display().to_string(),
                created_time: created_time(&path),
                name,
            });
        }

        // Oldest first; name as a deterministic tiebreak.
        entries.sort_by(|a, b| {
            a.created_time
                .cmp(&b.created_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        tokio::fs::read_to_string(id)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_string() },
                _ => StoreError::ReadFailed {
                    id: id.to_string(),
                    message: e.to_string(),
                },
            })
    }

    async fn write(&self, folder: &Path, name: &str, content: &str) -> Result<String, StoreError> {
        let write_err = |message: String| StoreError::WriteFailed {
            folder: folder.display().to_string(),
            name: name.to_string(),
            message,
        };

        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|e| write_err(e.to_string()))?;

        // Never clobber an existing object with the same name.
        let mut path = folder.join(name);
        if path.exists() {
            let disambiguated = format!("{}_{}", name, Uuid::new_v4().simple());
            path = folder.join(disambiguated);
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        Ok(path.display().to_string())
    }

    async fn move_object(&self, id: &str, to_folder: &Path) -> Result<(), StoreError> {
        let move_err = |message: String| StoreError::MoveFailed {
            id: id.to_string(),
            to_folder: to_folder.display().to_string(),
            message,
        };

        let source = PathBuf::from(id);
        let name = source
            .file_name()
            .ok_or_else(|| move_err("object id has no file name".to_string()))?;

        tokio::fs::create_dir_all(to_folder)
            .await
            .map_err(|e| move_err(e.to_string()))?;
        tokio::fs::rename(&source, to_folder.join(name))
            .await
            .map_err(|e| move_err(e.to_string()))
    }
}
