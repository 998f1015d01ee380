//! Sorted listing of a folder's child folders and files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::{BoxroomError, Result};

use super::folder::Folder;
use super::user_file::UserFile;

/// Column a listing is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Date,
    Size,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Date => "date",
            Self::Size => "size",
        }
    }
}

impl FromStr for SortField {
    type Err = BoxroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "date" => Ok(Self::Date),
            "size" => Ok(Self::Size),
            other => Err(BoxroomError::Validation(format!(
                "unknown sort field {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Return the SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = BoxroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(BoxroomError::Validation(format!(
                "unknown sort direction {other:?}"
            ))),
        }
    }
}

/// A listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRequest {
    pub folder_id: i64,
    pub sort_field: SortField,
    pub sort_dir: SortDirection,
}

impl ListingRequest {
    /// List a folder by name, ascending.
    pub fn new(folder_id: i64) -> Self {
        Self {
            folder_id,
            sort_field: SortField::default(),
            sort_dir: SortDirection::default(),
        }
    }

    /// Set the sort order.
    pub fn sorted_by(mut self, sort_field: SortField, sort_dir: SortDirection) -> Self {
        self.sort_field = sort_field;
        self.sort_dir = sort_dir;
        self
    }
}

/// Query-string style sort parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingParams {
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_dir: Option<String>,
}

impl ListingParams {
    /// Parse the parameters into a request; missing values use name/asc.
    pub fn into_request(self, folder_id: i64) -> Result<ListingRequest> {
        let sort_field = match self.sort_field.as_deref() {
            Some(field) => field.parse()?,
            None => SortField::default(),
        };
        let sort_dir = match self.sort_dir.as_deref() {
            Some(dir) => dir.parse()?,
            None => SortDirection::default(),
        };
        Ok(ListingRequest::new(folder_id).sorted_by(sort_field, sort_dir))
    }
}

/// The sorted contents of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub folders: Vec<Folder>,
    pub files: Vec<UserFile>,
}

fn folder_order(field: SortField, dir: SortDirection) -> String {
    let dir = dir.as_sql();
    match field {
        SortField::Name => format!("name COLLATE NOCASE {dir}, id ASC"),
        SortField::Date => format!("updated_at {dir}, id {dir}"),
        // Folders carry no size of their own.
        SortField::Size => "name COLLATE NOCASE ASC, id ASC".to_string(),
    }
}

fn file_order(field: SortField, dir: SortDirection) -> String {
    let dir = dir.as_sql();
    match field {
        SortField::Name => format!("file_name COLLATE NOCASE {dir}, id ASC"),
        SortField::Date => format!("updated_at {dir}, id {dir}"),
        SortField::Size => format!("file_size {dir}, id ASC"),
    }
}

/// Read-only listing service.
pub struct FilesAndFolders<'a> {
    db: &'a Database,
}

impl<'a> FilesAndFolders<'a> {
    /// Create a new listing service.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// List the child folders and files of a folder.
    pub async fn call(&self, request: &ListingRequest) -> Result<Listing> {
        let mut tx = self.db.begin_read().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM folders WHERE id = ?)")
            .bind(request.folder_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }

        let folders = sqlx::query_as::<_, Folder>(&format!(
            "SELECT id, name, parent_id, is_root, created_at, updated_at
             FROM folders WHERE parent_id = ? ORDER BY {}",
            folder_order(request.sort_field, request.sort_dir)
        ))
        .bind(request.folder_id)
        .fetch_all(&mut *tx)
        .await?;

        let files = sqlx::query_as::<_, UserFile>(&format!(
            "SELECT id, folder_id, file_name, content_type, file_size, storage_key, created_at, updated_at
             FROM user_files WHERE folder_id = ? ORDER BY {}",
            file_order(request.sort_field, request.sort_dir)
        ))
        .bind(request.folder_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Listing { folders, files })
    }
}

/// List a folder with string sort parameters.
pub async fn list_files_and_folders(
    db: &Database,
    folder_id: i64,
    sort_field: &str,
    sort_dir: &str,
) -> Result<Listing> {
    let request = ListingRequest::new(folder_id).sorted_by(sort_field.parse()?, sort_dir.parse()?);
    FilesAndFolders::new(db).call(&request).await
}
