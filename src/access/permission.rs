//! Per-folder, per-group permission records.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use crate::db::Database;
use crate::library::FolderRepository;
use crate::{BoxroomError, Result};

use super::group::GroupRepository;

/// An operation a group may be allowed to perform on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    fn column(self) -> &'static str {
        match self {
            Action::Create => "can_create",
            Action::Read => "can_read",
            Action::Update => "can_update",
            Action::Delete => "can_delete",
        }
    }
}

/// The four capability flags of a permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionFlags {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

impl PermissionFlags {
    /// Flags given to a group that has no inherited row.
    pub const READ_ONLY: Self = Self {
        create: false,
        read: true,
        update: false,
        delete: false,
    };

    /// Every action allowed.
    pub const FULL: Self = Self {
        create: true,
        read: true,
        update: true,
        delete: true,
    };

    /// Nothing allowed.
    pub const NONE: Self = Self {
        create: false,
        read: false,
        update: false,
        delete: false,
    };

    /// Check whether these flags grant `action`.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.create,
            Action::Read => self.read,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }
}

impl Default for PermissionFlags {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

/// A (folder, group) permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Permission {
    pub id: i64,
    pub folder_id: i64,
    pub group_id: i64,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl Permission {
    /// The row's flags.
    pub fn flags(&self) -> PermissionFlags {
        PermissionFlags {
            create: self.can_create,
            read: self.can_read,
            update: self.can_update,
            delete: self.can_delete,
        }
    }

    /// Check whether this row grants `action`.
    pub fn allows(&self, action: Action) -> bool {
        self.flags().allows(action)
    }
}

/// Partial update of a permission row; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionUpdate {
    pub can_create: Option<bool>,
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub can_delete: Option<bool>,
}

impl PermissionUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set every flag from `flags`.
    pub fn from_flags(flags: PermissionFlags) -> Self {
        Self {
            can_create: Some(flags.create),
            can_read: Some(flags.read),
            can_update: Some(flags.update),
            can_delete: Some(flags.delete),
        }
    }

    pub fn with_create(mut self, allowed: bool) -> Self {
        self.can_create = Some(allowed);
        self
    }

    pub fn with_read(mut self, allowed: bool) -> Self {
        self.can_read = Some(allowed);
        self
    }

    pub fn with_update(mut self, allowed: bool) -> Self {
        self.can_update = Some(allowed);
        self
    }

    pub fn with_delete(mut self, allowed: bool) -> Self {
        self.can_delete = Some(allowed);
        self
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.can_create.is_none()
            && self.can_read.is_none()
            && self.can_update.is_none()
            && self.can_delete.is_none()
    }
}

const SELECT_PERMISSION: &str = "SELECT id, folder_id, group_id, can_create, can_read, can_update, can_delete
     FROM permissions";

/// Row-level permission operations.
pub struct PermissionRepository;

impl PermissionRepository {
    /// Give a freshly created folder one row per existing group.
    ///
    /// Each row copies the group's flags on `parent_id`; groups without a
    /// row there (and every group when there is no parent) get
    /// [`PermissionFlags::READ_ONLY`].
    pub async fn snapshot_for_folder(
        conn: &mut SqliteConnection,
        folder_id: i64,
        parent_id: Option<i64>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO permissions (folder_id, group_id, can_create, can_read, can_update, can_delete)
             SELECT ?, g.id,
                    COALESCE(p.can_create, 0),
                    COALESCE(p.can_read, 1),
                    COALESCE(p.can_update, 0),
                    COALESCE(p.can_delete, 0)
             FROM user_groups g
             LEFT JOIN permissions p ON p.group_id = g.id AND p.folder_id = ?
             ORDER BY g.id",
        )
        .bind(folder_id)
        .bind(parent_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Give a freshly created group a read-only row on every folder.
    pub async fn grant_default_on_all_folders(
        conn: &mut SqliteConnection,
        group_id: i64,
    ) -> Result<u64> {
        let defaults = PermissionFlags::READ_ONLY;
        let result = sqlx::query(
            "INSERT INTO permissions (folder_id, group_id, can_create, can_read, can_update, can_delete)
             SELECT id, ?, ?, ?, ?, ? FROM folders ORDER BY id",
        )
        .bind(group_id)
        .bind(defaults.create)
        .bind(defaults.read)
        .bind(defaults.update)
        .bind(defaults.delete)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Get a permission by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Permission>> {
        let permission = sqlx::query_as::<_, Permission>(&format!("{SELECT_PERMISSION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(permission)
    }

    /// Get the row for a (folder, group) pair.
    pub async fn get(
        conn: &mut SqliteConnection,
        folder_id: i64,
        group_id: i64,
    ) -> Result<Option<Permission>> {
        let permission = sqlx::query_as::<_, Permission>(&format!(
            "{SELECT_PERMISSION} WHERE folder_id = ? AND group_id = ?"
        ))
        .bind(folder_id)
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(permission)
    }

    /// All rows of a folder, ordered by group.
    pub async fn list_by_folder(
        conn: &mut SqliteConnection,
        folder_id: i64,
    ) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(&format!(
            "{SELECT_PERMISSION} WHERE folder_id = ? ORDER BY group_id"
        ))
        .bind(folder_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(permissions)
    }

    /// All rows of a group, ordered by folder.
    pub async fn list_by_group(
        conn: &mut SqliteConnection,
        group_id: i64,
    ) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(&format!(
            "{SELECT_PERMISSION} WHERE group_id = ? ORDER BY folder_id"
        ))
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(permissions)
    }

    /// Apply a partial update to one row.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        update: &PermissionUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE permissions SET
                 can_create = COALESCE(?, can_create),
                 can_read = COALESCE(?, can_read),
                 can_update = COALESCE(?, can_update),
                 can_delete = COALESCE(?, can_delete)
             WHERE id = ?",
        )
        .bind(update.can_create)
        .bind(update.can_read)
        .bind(update.can_update)
        .bind(update.can_delete)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a partial update to a group's rows on a folder and all of its
    /// descendants.
    pub async fn update_subtree(
        conn: &mut SqliteConnection,
        folder_id: i64,
        group_id: i64,
        update: &PermissionUpdate,
    ) -> Result<u64> {
        let result = sqlx::query(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT ?
                 UNION ALL
                 SELECT f.id FROM folders f JOIN subtree s ON f.parent_id = s.id
             )
             UPDATE permissions SET
                 can_create = COALESCE(?, can_create),
                 can_read = COALESCE(?, can_read),
                 can_update = COALESCE(?, can_update),
                 can_delete = COALESCE(?, can_delete)
             WHERE group_id = ? AND folder_id IN (SELECT id FROM subtree)",
        )
        .bind(folder_id)
        .bind(update.can_create)
        .bind(update.can_read)
        .bind(update.can_update)
        .bind(update.can_delete)
        .bind(group_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete every row of a folder.
    pub async fn delete_by_folder(conn: &mut SqliteConnection, folder_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM permissions WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete every row of a group.
    pub async fn delete_by_group(conn: &mut SqliteConnection, group_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM permissions WHERE group_id = ?")
            .bind(group_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Count all rows.
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM permissions")
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Count the rows of a folder.
    pub async fn count_by_folder(conn: &mut SqliteConnection, folder_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM permissions WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Whether any of `group_ids` is granted `action` on the folder.
    pub async fn allows(
        conn: &mut SqliteConnection,
        folder_id: i64,
        group_ids: &[i64],
        action: Action,
    ) -> Result<bool> {
        if group_ids.is_empty() {
            return Ok(false);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM permissions WHERE folder_id = ");
        query.push_bind(folder_id);
        query.push(" AND ");
        query.push(action.column());
        query.push(" = 1 AND group_id IN (");
        let mut separated = query.separated(", ");
        for id in group_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated("))");

        let allowed = query
            .build_query_scalar::<bool>()
            .fetch_one(&mut *conn)
            .await?;

        Ok(allowed)
    }
}

/// Permission operations on top of a [`Database`].
pub struct PermissionService<'a> {
    db: &'a Database,
}

impl<'a> PermissionService<'a> {
    /// Create a new PermissionService.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a permission by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Permission> {
        let mut conn = self.db.acquire().await?;
        PermissionRepository::get_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("permission".to_string()))
    }

    /// Get the row for a (folder, group) pair.
    pub async fn get(&self, folder_id: i64, group_id: i64) -> Result<Option<Permission>> {
        let mut conn = self.db.acquire().await?;
        PermissionRepository::get(&mut conn, folder_id, group_id).await
    }

    /// All rows of a folder.
    pub async fn for_folder(&self, folder_id: i64) -> Result<Vec<Permission>> {
        let mut conn = self.db.acquire().await?;
        PermissionRepository::list_by_folder(&mut conn, folder_id).await
    }

    /// All rows of a group.
    pub async fn for_group(&self, group_id: i64) -> Result<Vec<Permission>> {
        let mut conn = self.db.acquire().await?;
        PermissionRepository::list_by_group(&mut conn, group_id).await
    }

    /// Update the flags of one row.
    pub async fn update(&self, id: i64, update: &PermissionUpdate) -> Result<Permission> {
        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        if !PermissionRepository::update(&mut tx, id, update).await? {
            return Err(BoxroomError::NotFound("permission".to_string()));
        }
        let permission = PermissionRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("permission".to_string()))?;
        tx.commit().await?;

        Ok(permission)
    }

    /// Update a group's rows on a folder and everything below it.
    ///
    /// Returns the number of rows changed.
    pub async fn update_for_subtree(
        &self,
        folder_id: i64,
        group_id: i64,
        update: &PermissionUpdate,
    ) -> Result<u64> {
        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        if FolderRepository::get_by_id(&mut tx, folder_id).await?.is_none() {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }
        if GroupRepository::get_by_id(&mut tx, group_id).await?.is_none() {
            return Err(BoxroomError::NotFound("group".to_string()));
        }

        let changed = PermissionRepository::update_subtree(&mut tx, folder_id, group_id, update).await?;
        tx.commit().await?;

        info!(
            "Updated permissions of group {} on {} folders below folder {}",
            group_id, changed, folder_id
        );
        Ok(changed)
    }

    /// Whether any of `group_ids` may perform `action` on the folder.
    pub async fn allows(&self, folder_id: i64, group_ids: &[i64], action: Action) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        PermissionRepository::allows(&mut conn, folder_id, group_ids, action).await
    }
}
