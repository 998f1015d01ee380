//! Folder types and repository for the Boxroom library.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{BoxroomError, Result};

/// A folder in the library tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Folder {
    /// Unique folder ID.
    pub id: i64,
    /// Folder name, unique among its siblings.
    pub name: String,
    /// Parent folder ID (None only for the root).
    pub parent_id: Option<i64>,
    /// Root marker.
    pub is_root: bool,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
    /// When the folder was last renamed or moved.
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    /// Whether this is the root folder.
    pub fn is_root(&self) -> bool {
        self.is_root && self.parent_id.is_none()
    }
}

/// Data for creating a new folder.
#[derive(Debug, Clone, Default)]
pub struct NewFolder {
    /// Folder name.
    pub name: String,
    /// Parent folder ID; required for every folder but the root.
    pub parent_id: Option<i64>,
}

impl NewFolder {
    /// Create a new NewFolder without a parent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
        }
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Rows removed by a cascading destroy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removal {
    /// Folders removed, including the destroyed folder itself.
    pub folders: u64,
    /// Files removed from the whole subtree.
    pub files: u64,
    /// Permission rows removed from the whole subtree.
    pub permissions: u64,
}

/// Row-level folder operations.
///
/// Every function runs on the connection it is given, so callers compose
/// them inside a single transaction.
pub struct FolderRepository;

impl FolderRepository {
    /// Insert a non-root folder under `parent_id`.
    pub async fn create(conn: &mut SqliteConnection, name: &str, parent_id: i64) -> Result<Folder> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO folders (name, parent_id, is_root, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(parent_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))
    }

    /// Insert the root folder.
    pub async fn create_root(conn: &mut SqliteConnection, name: &str) -> Result<Folder> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO folders (name, parent_id, is_root, created_at, updated_at)
             VALUES (?, NULL, 1, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("root folder".to_string()))
    }

    /// Get a folder by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, name, parent_id, is_root, created_at, updated_at
             FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(folder)
    }

    /// Get the root folder row, if it exists.
    pub async fn get_root(conn: &mut SqliteConnection) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, name, parent_id, is_root, created_at, updated_at
             FROM folders WHERE is_root = 1",
        )
        .fetch_optional(&mut *conn)
        .await?;

        Ok(folder)
    }

    /// List child folders of a parent folder in insertion order.
    pub async fn list_by_parent(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(
            "SELECT id, name, parent_id, is_root, created_at, updated_at
             FROM folders WHERE parent_id = ? ORDER BY id",
        )
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(folders)
    }

    /// IDs of the child folders of a parent folder in insertion order.
    pub async fn child_ids(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM folders WHERE parent_id = ? ORDER BY id")
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(ids)
    }

    /// Count child folders of a parent folder.
    pub async fn count_children(conn: &mut SqliteConnection, parent_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM folders WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Count all folders, root included.
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM folders")
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Check if `parent_id` already has a child folder called `name`.
    ///
    /// `exclude_id` skips one folder, so a folder never collides with itself.
    pub async fn name_exists(
        conn: &mut SqliteConnection,
        parent_id: i64,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM folders
                           WHERE parent_id = ? AND name = ? AND id IS NOT ?)",
        )
        .bind(parent_id)
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    /// Rename a folder.
    pub async fn rename(conn: &mut SqliteConnection, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE folders SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reparent a folder.
    pub async fn set_parent(conn: &mut SqliteConnection, id: i64, parent_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE folders SET parent_id = ?, updated_at = ? WHERE id = ?")
            .bind(parent_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a single folder row.
    ///
    /// Fails on the foreign keys if files, permissions or children remain.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ? AND is_root = 0")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Parent of a folder: `None` if the folder doesn't exist,
    /// `Some(None)` for the root.
    pub async fn parent_id_of(conn: &mut SqliteConnection, id: i64) -> Result<Option<Option<i64>>> {
        let parent = sqlx::query_scalar("SELECT parent_id FROM folders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(parent)
    }

    /// Whether `ancestor_id` appears in the ancestor chain of `folder_id`.
    ///
    /// A folder is never its own ancestor.
    pub async fn is_ancestor(
        conn: &mut SqliteConnection,
        ancestor_id: i64,
        folder_id: i64,
    ) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut current = Self::parent_id_of(conn, folder_id).await?.flatten();

        while let Some(id) = current {
            if id == ancestor_id {
                return Ok(true);
            }
            if !visited.insert(id) {
                break;
            }
            current = Self::parent_id_of(conn, id).await?.flatten();
        }

        Ok(false)
    }

    /// Get the path from the root to a folder.
    pub async fn path(conn: &mut SqliteConnection, id: i64) -> Result<Vec<Folder>> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current_id = Some(id);

        while let Some(folder_id) = current_id {
            if !visited.insert(folder_id) {
                break;
            }
            match Self::get_by_id(conn, folder_id).await? {
                Some(folder) => {
                    current_id = folder.parent_id;
                    path.push(folder);
                }
                None => break,
            }
        }

        path.reverse();
        Ok(path)
    }

    /// IDs of a folder and all its descendants, children before parents.
    ///
    /// Depth-first post-order; siblings in insertion order.
    pub async fn subtree_post_order(conn: &mut SqliteConnection, id: i64) -> Result<Vec<i64>> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];

        while let Some((folder_id, expanded)) = stack.pop() {
            if expanded {
                order.push(folder_id);
                continue;
            }
            stack.push((folder_id, true));
            for child in Self::child_ids(conn, folder_id).await?.into_iter().rev() {
                stack.push((child, false));
            }
        }

        Ok(order)
    }

    /// Total size in bytes of all files below a folder.
    pub async fn total_size(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        let size = sqlx::query_scalar(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT ?
                 UNION ALL
                 SELECT f.id FROM folders f JOIN subtree s ON f.parent_id = s.id
             )
             SELECT COALESCE(SUM(file_size), 0) FROM user_files
             WHERE folder_id IN (SELECT id FROM subtree)",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(size)
    }
}
