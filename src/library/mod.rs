//! Document library for Boxroom.
//!
//! This module provides the folder tree and its files:
//! - Folder hierarchy with a single root and unique sibling names
//! - Move, copy and cascading destroy for folders and files
//! - Sorted listings of a folder's contents
//! - Attachment storage behind an opaque key

mod entry;
mod file_service;
mod folder;
mod folder_service;
mod listing;
mod root;
mod storage;
mod user_file;

pub use entry::{require_folder_target, Entry, EntryKind, EntryRef, EntryService};
pub use file_service::{Download, UploadRequest, UserFileService};
pub use folder::{Folder, FolderRepository, NewFolder, Removal};
pub use folder_service::FolderService;
pub use listing::{
    list_files_and_folders, FilesAndFolders, Listing, ListingParams, ListingRequest,
    SortDirection, SortField,
};
pub use root::RootCache;
pub use storage::{generate_key, AttachmentStore, FileStorage, MemoryStorage};
pub use user_file::{NewUserFile, UserFile, UserFileRepository};

use crate::{BoxroomError, Result};

/// Name of the root folder.
pub const ROOT_FOLDER_NAME: &str = "Root folder";

/// Maximum length for folder, file and group names (in characters).
pub const MAX_NAME_LENGTH: usize = 255;

/// Default maximum upload size (100MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate a folder, file or group name and return it trimmed.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BoxroomError::Validation(format!(
            "{kind} name must not be empty"
        )));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(BoxroomError::Validation(format!(
            "{kind} name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}
