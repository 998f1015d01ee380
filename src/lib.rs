//! Boxroom - hierarchical document library
//!
//! A folder tree of files with per-group permissions, backed by SQLite.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod logging;

pub use access::{
    Action, Group, GroupService, NewGroup, Permission, PermissionFlags, PermissionService,
    PermissionUpdate,
};
pub use config::Config;
pub use db::Database;
pub use error::{BoxroomError, Result};
pub use library::{
    list_files_and_folders, AttachmentStore, Entry, EntryKind, EntryRef, EntryService,
    FileStorage, FilesAndFolders, Folder, FolderService, Listing, ListingParams, ListingRequest,
    MemoryStorage, NewFolder, NewUserFile, Removal, SortDirection, SortField, UploadRequest,
    UserFile, UserFileService, ROOT_FOLDER_NAME,
};
