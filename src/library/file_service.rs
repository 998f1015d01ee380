//! File service for Boxroom.
//!
//! This module provides high-level file operations including:
//! - Upload with size and name checks
//! - Download through the attachment store
//! - Rename, move, copy and deletion

use sqlx::SqliteConnection;
use tracing::info;

use crate::config::StorageConfig;
use crate::db::Database;
use crate::{BoxroomError, Result};

use super::entry::{require_folder_target, EntryRef};
use super::folder::FolderRepository;
use super::storage::{discard_attachments, AttachmentStore};
use super::user_file::{NewUserFile, UserFile, UserFileRepository};
use super::{validate_name, DEFAULT_MAX_FILE_SIZE};

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Folder ID to upload to.
    pub folder_id: i64,
    /// Original filename.
    pub file_name: String,
    /// File content.
    pub content: Vec<u8>,
    /// MIME type; guessed from the filename when absent.
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Create a new upload request.
    pub fn new(folder_id: i64, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            folder_id,
            file_name: file_name.into(),
            content,
            content_type: None,
        }
    }

    /// Set the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of a file download.
#[derive(Debug)]
pub struct Download {
    /// File metadata.
    pub file: UserFile,
    /// File content.
    pub content: Vec<u8>,
}

fn guess_content_type(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// File service for managing uploads and file entries.
pub struct UserFileService<'a> {
    db: &'a Database,
    storage: &'a dyn AttachmentStore,
    max_file_size: u64,
}

impl<'a> UserFileService<'a> {
    /// Create a new UserFileService.
    pub fn new(db: &'a Database, storage: &'a dyn AttachmentStore) -> Self {
        Self {
            db,
            storage,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Create a UserFileService limited to the configured upload size.
    pub fn from_config(
        db: &'a Database,
        storage: &'a dyn AttachmentStore,
        config: &StorageConfig,
    ) -> Result<Self> {
        Ok(Self::new(db, storage).with_max_file_size(config.max_upload_bytes()?))
    }

    /// Create a new UserFileService with a custom max file size.
    pub fn with_max_file_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    /// Largest accepted upload in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Upload a file.
    ///
    /// # Validation
    /// - Filename: non-empty, max 255 characters, unique in the folder
    /// - File size: max configured size (default 100MB)
    ///
    /// The bytes are stored first; if the row cannot be committed they are
    /// removed again.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UserFile> {
        let file_name = validate_name("file", &request.file_name)?;

        if request.content.len() as u64 > self.max_file_size {
            return Err(BoxroomError::Validation(format!(
                "file is too large (max {} bytes)",
                self.max_file_size
            )));
        }

        let content_type = request
            .content_type
            .clone()
            .or_else(|| guess_content_type(&file_name));

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        ensure_folder(&mut tx, request.folder_id).await?;
        ensure_name_free(&mut tx, request.folder_id, &file_name, None).await?;

        let key = self.storage.save(&request.content, &file_name)?;
        let new_file = NewUserFile {
            folder_id: request.folder_id,
            file_name,
            content_type,
            file_size: request.content.len() as i64,
            storage_key: key,
        };

        let file = match UserFileRepository::create(&mut tx, &new_file).await {
            Ok(file) => file,
            Err(e) => {
                discard_attachments(self.storage, std::slice::from_ref(&new_file.storage_key));
                return Err(e);
            }
        };
        if let Err(e) = tx.commit().await {
            discard_attachments(self.storage, std::slice::from_ref(&new_file.storage_key));
            return Err(e.into());
        }

        info!(
            "Uploaded file {} ({}, {} bytes) to folder {}",
            file.id, file.file_name, file.file_size, file.folder_id
        );
        Ok(file)
    }

    /// Register a file whose bytes are already in the attachment store.
    pub async fn create(&self, new_file: &NewUserFile) -> Result<UserFile> {
        let file_name = validate_name("file", &new_file.file_name)?;
        let new_file = NewUserFile {
            content_type: new_file
                .content_type
                .clone()
                .or_else(|| guess_content_type(&file_name)),
            file_name,
            ..new_file.clone()
        };

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        ensure_folder(&mut tx, new_file.folder_id).await?;
        ensure_name_free(&mut tx, new_file.folder_id, &new_file.file_name, None).await?;

        let file = UserFileRepository::create(&mut tx, &new_file).await?;
        tx.commit().await?;

        info!("Created file {} ({})", file.id, file.file_name);
        Ok(file)
    }

    /// Get a file by ID.
    pub async fn get(&self, id: i64) -> Result<UserFile> {
        let mut conn = self.db.acquire().await?;
        UserFileRepository::get_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("file".to_string()))
    }

    /// List the files of a folder in insertion order.
    pub async fn list(&self, folder_id: i64) -> Result<Vec<UserFile>> {
        let mut conn = self.db.acquire().await?;
        ensure_folder(&mut conn, folder_id).await?;
        UserFileRepository::list_by_folder(&mut conn, folder_id).await
    }

    /// Load a file with its content.
    pub async fn download(&self, id: i64) -> Result<Download> {
        let file = self.get(id).await?;
        let content = self.storage.load(&file.storage_key)?;
        Ok(Download { file, content })
    }

    /// Rename a file.
    pub async fn rename(&self, id: i64, name: &str) -> Result<UserFile> {
        let file_name = validate_name("file", name)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        let file = get_file(&mut tx, id).await?;
        ensure_name_free(&mut tx, file.folder_id, &file_name, Some(id)).await?;

        UserFileRepository::rename(&mut tx, id, &file_name).await?;
        let renamed = get_file(&mut tx, id).await?;
        tx.commit().await?;

        info!("Renamed file {} to {}", id, renamed.file_name);
        Ok(renamed)
    }

    /// Move a file into `target`.
    pub async fn move_to(&self, id: i64, target: Option<EntryRef>) -> Result<UserFile> {
        let target_id = require_folder_target(target)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        let file = get_file(&mut tx, id).await?;
        ensure_folder(&mut tx, target_id).await?;
        ensure_name_free(&mut tx, target_id, &file.file_name, Some(id)).await?;

        UserFileRepository::set_folder(&mut tx, id, target_id).await?;
        let moved = get_file(&mut tx, id).await?;
        tx.commit().await?;

        info!("Moved file {} into {}", id, target_id);
        Ok(moved)
    }

    /// Copy a file, bytes included, into `target`.
    pub async fn copy_to(&self, id: i64, target: Option<EntryRef>) -> Result<UserFile> {
        let target_id = require_folder_target(target)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        let file = get_file(&mut tx, id).await?;
        ensure_folder(&mut tx, target_id).await?;
        ensure_name_free(&mut tx, target_id, &file.file_name, None).await?;

        let key = self.storage.duplicate(&file.storage_key)?;
        let mut new_file = NewUserFile::new(target_id, file.file_name, key, file.file_size);
        new_file.content_type = file.content_type;

        let copy = match UserFileRepository::create(&mut tx, &new_file).await {
            Ok(copy) => copy,
            Err(e) => {
                discard_attachments(self.storage, std::slice::from_ref(&new_file.storage_key));
                return Err(e);
            }
        };
        if let Err(e) = tx.commit().await {
            discard_attachments(self.storage, std::slice::from_ref(&new_file.storage_key));
            return Err(e.into());
        }

        info!("Copied file {} into {} as {}", id, target_id, copy.id);
        Ok(copy)
    }

    /// Delete a file and its bytes.
    pub async fn destroy(&self, id: i64) -> Result<UserFile> {
        let file = {
            let _guard = self.db.lock_structure().await;
            let mut tx = self.db.begin().await?;
            let file = get_file(&mut tx, id).await?;
            UserFileRepository::delete(&mut tx, id).await?;
            tx.commit().await?;
            file
        };

        discard_attachments(self.storage, std::slice::from_ref(&file.storage_key));

        info!("Destroyed file {} ({})", file.id, file.file_name);
        Ok(file)
    }
}

async fn get_file(conn: &mut SqliteConnection, id: i64) -> Result<UserFile> {
    UserFileRepository::get_by_id(conn, id)
        .await?
        .ok_or_else(|| BoxroomError::NotFound("file".to_string()))
}

async fn ensure_folder(conn: &mut SqliteConnection, folder_id: i64) -> Result<()> {
    if FolderRepository::get_by_id(conn, folder_id).await?.is_none() {
        return Err(BoxroomError::NotFound("folder".to_string()));
    }
    Ok(())
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    folder_id: i64,
    file_name: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    if UserFileRepository::name_exists(conn, folder_id, file_name, exclude_id).await? {
        return Err(BoxroomError::Validation(format!(
            "a file named {file_name:?} already exists in this folder"
        )));
    }
    Ok(())
}
