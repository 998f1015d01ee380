//! Entries: the common face of folders and files.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::{BoxroomError, Result};

use super::file_service::UserFileService;
use super::folder::{Folder, Removal};
use super::folder_service::FolderService;
use super::storage::AttachmentStore;
use super::user_file::UserFile;

/// Kind of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

impl EntryKind {
    /// Lowercase name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Folder => "folder",
            EntryKind::File => "file",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an entry by kind and ID, without loading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryRef {
    Folder(i64),
    File(i64),
}

impl EntryRef {
    /// The referenced ID.
    pub fn id(&self) -> i64 {
        match self {
            EntryRef::Folder(id) | EntryRef::File(id) => *id,
        }
    }

    /// The referenced kind.
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryRef::Folder(_) => EntryKind::Folder,
            EntryRef::File(_) => EntryKind::File,
        }
    }
}

/// A loaded folder or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entry {
    Folder(Folder),
    File(UserFile),
}

impl Entry {
    pub fn id(&self) -> i64 {
        match self {
            Entry::Folder(folder) => folder.id,
            Entry::File(file) => file.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::Folder(folder) => &folder.name,
            Entry::File(file) => &file.file_name,
        }
    }

    /// Containing folder; `None` only for the root.
    pub fn parent_id(&self) -> Option<i64> {
        match self {
            Entry::Folder(folder) => folder.parent_id,
            Entry::File(file) => Some(file.folder_id),
        }
    }

    /// Last-modified timestamp used for date sorting.
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Entry::Folder(folder) => folder.updated_at,
            Entry::File(file) => file.updated_at,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Folder(_) => EntryKind::Folder,
            Entry::File(_) => EntryKind::File,
        }
    }

    /// Reference to this entry.
    pub fn to_ref(&self) -> EntryRef {
        match self {
            Entry::Folder(folder) => EntryRef::Folder(folder.id),
            Entry::File(file) => EntryRef::File(file.id),
        }
    }
}

impl From<Folder> for Entry {
    fn from(folder: Folder) -> Self {
        Entry::Folder(folder)
    }
}

impl From<UserFile> for Entry {
    fn from(file: UserFile) -> Self {
        Entry::File(file)
    }
}

/// Check a move or copy target and return the destination folder ID.
///
/// A missing target is a structural error; a file target is a type mismatch.
pub fn require_folder_target(target: Option<EntryRef>) -> Result<i64> {
    match target {
        None => Err(BoxroomError::Structural(
            "a target folder is required".to_string(),
        )),
        Some(EntryRef::File(_)) => Err(BoxroomError::TypeMismatch {
            expected: EntryKind::Folder.as_str(),
            found: EntryKind::File.as_str(),
        }),
        Some(EntryRef::Folder(id)) => Ok(id),
    }
}

/// Dispatches entry operations to the folder or file service.
pub struct EntryService<'a> {
    folders: FolderService<'a>,
    files: UserFileService<'a>,
}

impl<'a> EntryService<'a> {
    /// Create a new EntryService.
    pub fn new(db: &'a Database, storage: &'a dyn AttachmentStore) -> Self {
        Self {
            folders: FolderService::new(db, storage),
            files: UserFileService::new(db, storage),
        }
    }

    /// Load an entry.
    pub async fn get(&self, entry: EntryRef) -> Result<Entry> {
        match entry {
            EntryRef::Folder(id) => self.folders.get(id).await.map(Entry::from),
            EntryRef::File(id) => self.files.get(id).await.map(Entry::from),
        }
    }

    /// Size in bytes; for folders the total of the whole subtree.
    pub async fn size(&self, entry: EntryRef) -> Result<i64> {
        match entry {
            EntryRef::Folder(id) => self.folders.size(id).await,
            EntryRef::File(id) => Ok(self.files.get(id).await?.file_size),
        }
    }

    /// Move an entry into the target folder.
    pub async fn move_entry(&self, entry: EntryRef, target: Option<EntryRef>) -> Result<Entry> {
        match entry {
            EntryRef::Folder(id) => self.folders.move_to(id, target).await.map(Entry::from),
            EntryRef::File(id) => self.files.move_to(id, target).await.map(Entry::from),
        }
    }

    /// Copy an entry into the target folder and return the copy.
    pub async fn copy_entry(&self, entry: EntryRef, target: Option<EntryRef>) -> Result<Entry> {
        match entry {
            EntryRef::Folder(id) => self.folders.copy_to(id, target).await.map(Entry::from),
            EntryRef::File(id) => self.files.copy_to(id, target).await.map(Entry::from),
        }
    }

    /// Destroy an entry and everything it owns.
    pub async fn destroy(&self, entry: EntryRef) -> Result<Removal> {
        match entry {
            EntryRef::Folder(id) => self.folders.destroy(id).await,
            EntryRef::File(id) => {
                self.files.destroy(id).await?;
                Ok(Removal {
                    files: 1,
                    ..Removal::default()
                })
            }
        }
    }
}
