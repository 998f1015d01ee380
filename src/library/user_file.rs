//! File metadata and repository.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{BoxroomError, Result};

/// A file entry: attachment metadata inside a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserFile {
    /// Unique file ID.
    pub id: i64,
    /// Folder containing this file.
    pub folder_id: i64,
    /// File name shown to users, unique within the folder.
    pub file_name: String,
    /// MIME type.
    pub content_type: Option<String>,
    /// File size in bytes.
    pub file_size: i64,
    /// Attachment store key.
    #[serde(skip)]
    pub storage_key: String,
    /// Upload timestamp.
    pub created_at: DateTime<Utc>,
    /// Last rename or move.
    pub updated_at: DateTime<Utc>,
}

impl UserFile {
    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

/// Metadata for a file whose bytes are already stored.
#[derive(Debug, Clone)]
pub struct NewUserFile {
    pub folder_id: i64,
    pub file_name: String,
    pub content_type: Option<String>,
    pub file_size: i64,
    pub storage_key: String,
}

impl NewUserFile {
    /// Create a new NewUserFile.
    pub fn new(
        folder_id: i64,
        file_name: impl Into<String>,
        storage_key: impl Into<String>,
        file_size: i64,
    ) -> Self {
        Self {
            folder_id,
            file_name: file_name.into(),
            content_type: None,
            file_size,
            storage_key: storage_key.into(),
        }
    }

    /// Set the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

const SELECT_FILE: &str =
    "SELECT id, folder_id, file_name, content_type, file_size, storage_key, created_at, updated_at
     FROM user_files";

/// Row-level file operations.
pub struct UserFileRepository;

impl UserFileRepository {
    /// Insert a file row.
    pub async fn create(conn: &mut SqliteConnection, file: &NewUserFile) -> Result<UserFile> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO user_files (folder_id, file_name, content_type, file_size, storage_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(file.folder_id)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.file_size)
        .bind(&file.storage_key)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("file".to_string()))
    }

    /// Get a file by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<UserFile>> {
        let file = sqlx::query_as::<_, UserFile>(&format!("{SELECT_FILE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(file)
    }

    /// List the files of a folder in insertion order.
    pub async fn list_by_folder(
        conn: &mut SqliteConnection,
        folder_id: i64,
    ) -> Result<Vec<UserFile>> {
        let files = sqlx::query_as::<_, UserFile>(&format!(
            "{SELECT_FILE} WHERE folder_id = ? ORDER BY id"
        ))
        .bind(folder_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(files)
    }

    /// Check if a folder already holds a file called `file_name`.
    pub async fn name_exists(
        conn: &mut SqliteConnection,
        folder_id: i64,
        file_name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user_files
                           WHERE folder_id = ? AND file_name = ? AND id IS NOT ?)",
        )
        .bind(folder_id)
        .bind(file_name)
        .bind(exclude_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    /// Rename a file.
    pub async fn rename(conn: &mut SqliteConnection, id: i64, file_name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE user_files SET file_name = ?, updated_at = ? WHERE id = ?")
            .bind(file_name)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a file to another folder.
    pub async fn set_folder(conn: &mut SqliteConnection, id: i64, folder_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE user_files SET folder_id = ?, updated_at = ? WHERE id = ?")
            .bind(folder_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a file row.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_files WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every file of a folder and return their storage keys.
    pub async fn delete_by_folder(
        conn: &mut SqliteConnection,
        folder_id: i64,
    ) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar("DELETE FROM user_files WHERE folder_id = ? RETURNING storage_key")
            .bind(folder_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(keys)
    }

    /// Count all files.
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM user_files")
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Count the files of a folder.
    pub async fn count_by_folder(conn: &mut SqliteConnection, folder_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM user_files WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }
}
