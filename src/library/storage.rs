//! Attachment storage for Boxroom.
//!
//! The library only stores an opaque key per file; the bytes live in an
//! [`AttachmentStore`]. Two stores are provided:
//! - [`FileStorage`]: UUID-named files sharded by key prefix on local disk
//! - [`MemoryStorage`]: a keyed in-process map

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;
use uuid::Uuid;

use crate::{BoxroomError, Result};

/// Storage backend for attachment bytes.
pub trait AttachmentStore: Send + Sync {
    /// Store new content and return its key.
    ///
    /// `original_name` only contributes the key's extension.
    fn save(&self, content: &[u8], original_name: &str) -> Result<String>;

    /// Load the content stored under `key`.
    fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Copy the content under `key` to a fresh key and return it.
    fn duplicate(&self, key: &str) -> Result<String>;

    /// Remove the content under `key`; `false` if nothing was stored.
    fn delete(&self, key: &str) -> Result<bool>;
}

/// Generate a new UUID-based key with the extension of `original_name`.
pub fn generate_key(original_name: &str) -> String {
    let uuid = Uuid::new_v4();
    let ext = extract_extension(original_name);
    format!("{uuid}.{ext}")
}

/// Extract the file extension from a filename.
///
/// Returns "bin" if no extension is found.
fn extract_extension(filename: &str) -> &str {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("bin")
}

/// Keys are generated by the store itself; anything that could escape the
/// base directory is rejected.
fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(BoxroomError::Storage(format!("invalid attachment key: {key:?}")));
    }
    Ok(())
}

/// Remove attachments whose rows are gone (or were never committed).
///
/// Failures are logged; the rows are the source of truth.
pub(crate) fn discard_attachments(storage: &dyn AttachmentStore, keys: &[String]) {
    for key in keys {
        match storage.delete(key) {
            Ok(true) => {}
            Ok(false) => warn!("Attachment {} was already missing", key),
            Err(e) => warn!("Failed to delete attachment {}: {}", key, e),
        }
    }
}

/// Disk-backed attachment store.
///
/// Files are stored in a sharded directory structure:
/// ```text
/// {base_path}/
/// ├── ab/
/// │   └── ab12cd34-5678-90ab-cdef-123456789012.txt
/// └── cd/
///     └── cd90ab12-3456-7890-abcd-ef1234567890.bin
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Save content under a specific key.
    pub fn save_with_key(&self, content: &[u8], key: &str) -> Result<()> {
        check_key(key)?;
        let file_path = self.file_path(key);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&file_path, content)?;
        Ok(())
    }

    /// Check if content exists under `key`.
    pub fn exists(&self, key: &str) -> bool {
        check_key(key).is_ok() && self.file_path(key).exists()
    }

    /// Get the full path for a key: `{base_path}/{shard}/{key}`.
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.base_path.join(Self::shard(key)).join(key)
    }

    /// First two characters of the key (the UUID prefix).
    fn shard(key: &str) -> &str {
        key.get(..2).unwrap_or(key)
    }

    /// Remove empty shard directories.
    pub fn cleanup_empty_dirs(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.base_path)?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let empty = fs::read_dir(&path)
                    .map(|mut entries| entries.next().is_none())
                    .unwrap_or(false);
                if empty && fs::remove_dir(&path).is_ok() {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

impl AttachmentStore for FileStorage {
    fn save(&self, content: &[u8], original_name: &str) -> Result<String> {
        let key = generate_key(original_name);
        self.save_with_key(content, &key)?;
        Ok(key)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key)?;
        match fs::read(self.file_path(key)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BoxroomError::NotFound(format!("attachment {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn duplicate(&self, key: &str) -> Result<String> {
        let content = self.load(key)?;
        let new_key = generate_key(key);
        self.save_with_key(&content, &new_key)?;
        Ok(new_key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        match fs::remove_file(self.file_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process attachment store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attachments.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if content exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl AttachmentStore for MemoryStorage {
    fn save(&self, content: &[u8], original_name: &str) -> Result<String> {
        let key = generate_key(original_name);
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), content.to_vec());
        Ok(key)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| BoxroomError::NotFound(format!("attachment {key}")))
    }

    fn duplicate(&self, key: &str) -> Result<String> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let content = blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BoxroomError::NotFound(format!("attachment {key}")))?;
        let new_key = generate_key(key);
        blobs.insert(new_key.clone(), content);
        Ok(new_key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("uploads");
        assert!(!storage_path.exists());

        let storage = FileStorage::new(&storage_path).unwrap();

        assert!(storage_path.exists());
        assert_eq!(storage.base_path(), storage_path);
    }

    #[test]
    fn test_save_and_load() {
        let (_temp_dir, storage) = setup_storage();

        let key = storage.save(b"Hello, World!", "test.txt").unwrap();
        assert!(key.ends_with(".txt"));

        let shard_dir = storage.base_path().join(&key[..2]);
        assert!(shard_dir.is_dir());
        assert_eq!(storage.load(&key).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_load_not_found() {
        let (_temp_dir, storage) = setup_storage();
        let result = storage.load("nonexistent.txt");
        assert!(matches!(result, Err(BoxroomError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_creates_independent_copy() {
        let (_temp_dir, storage) = setup_storage();

        let key = storage.save(b"original", "report.pdf").unwrap();
        let copy = storage.duplicate(&key).unwrap();

        assert_ne!(key, copy);
        assert!(copy.ends_with(".pdf"));
        storage.delete(&key).unwrap();
        assert_eq!(storage.load(&copy).unwrap(), b"original");
    }

    #[test]
    fn test_delete() {
        let (_temp_dir, storage) = setup_storage();

        let key = storage.save(b"to delete", "delete.txt").unwrap();
        assert!(storage.exists(&key));

        assert!(storage.delete(&key).unwrap());
        assert!(!storage.exists(&key));
        assert!(!storage.delete(&key).unwrap());
    }

    #[test]
    fn test_rejects_traversal_keys() {
        let (_temp_dir, storage) = setup_storage();

        assert!(matches!(
            storage.load("../etc/passwd"),
            Err(BoxroomError::Storage(_))
        ));
        assert!(storage.delete("a/b").is_err());
        assert!(!storage.exists(".hidden"));
    }

    #[test]
    fn test_cleanup_empty_dirs() {
        let (_temp_dir, storage) = setup_storage();

        let key = storage.save(b"temp", "temp.txt").unwrap();
        storage.delete(&key).unwrap();

        assert!(storage.cleanup_empty_dirs().unwrap() >= 1);
    }

    #[test]
    fn test_extract_extension() {
        assert_eq!(extract_extension("test.txt"), "txt");
        assert_eq!(extract_extension("file.tar.gz"), "gz");
        assert_eq!(extract_extension("no_ext"), "bin");
        assert_eq!(extract_extension(".hidden"), "bin");
    }

    #[test]
    fn test_generate_key_unique() {
        let a = generate_key("a.txt");
        let b = generate_key("a.txt");
        assert_ne!(a, b);
        assert!(a.len() > 36);
    }

    #[test]
    fn test_discard_attachments_tolerates_missing() {
        let storage = MemoryStorage::new();
        let key = storage.save(b"x", "x.txt").unwrap();

        discard_attachments(&storage, &[key, "gone.txt".to_string()]);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());

        let key = storage.save(b"bytes", "notes.md").unwrap();
        let copy = storage.duplicate(&key).unwrap();

        assert_eq!(storage.len(), 2);
        assert_eq!(storage.load(&copy).unwrap(), b"bytes");
        assert!(storage.delete(&key).unwrap());
        assert!(!storage.contains(&key));
        assert!(matches!(
            storage.duplicate(&key),
            Err(BoxroomError::NotFound(_))
        ));
    }
}
