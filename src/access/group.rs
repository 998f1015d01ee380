//! User groups: the principals permissions are granted to.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::Database;
use crate::library::validate_name;
use crate::{BoxroomError, Result};

use super::permission::PermissionRepository;

/// A named group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
}

impl NewGroup {
    /// Create a new NewGroup.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Row-level group operations.
pub struct GroupRepository;

impl GroupRepository {
    /// Insert a group.
    pub async fn create(conn: &mut SqliteConnection, name: &str) -> Result<Group> {
        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO user_groups (name, created_at) VALUES (?, ?)
             RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(group)
    }

    /// Get a group by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, name, created_at FROM user_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(group)
    }

    /// Get a group by exact name.
    pub async fn get_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, name, created_at FROM user_groups WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(group)
    }

    /// List all groups by name.
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, name, created_at FROM user_groups ORDER BY name, id",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(groups)
    }

    /// Rename a group.
    pub async fn rename(conn: &mut SqliteConnection, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE user_groups SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a group row. Its permissions must already be gone.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_groups WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all groups.
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM user_groups")
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }
}

/// Group operations on top of a [`Database`].
pub struct GroupService<'a> {
    db: &'a Database,
}

impl<'a> GroupService<'a> {
    /// Create a new GroupService.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a group with a read-only permission on every folder.
    pub async fn create(&self, new_group: &NewGroup) -> Result<Group> {
        let name = validate_name("group", &new_group.name)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        if GroupRepository::get_by_name(&mut tx, &name).await?.is_some() {
            return Err(BoxroomError::Validation(format!(
                "group name {name:?} is already taken"
            )));
        }

        let group = GroupRepository::create(&mut tx, &name).await?;
        let granted = PermissionRepository::grant_default_on_all_folders(&mut tx, group.id).await?;
        tx.commit().await?;

        info!(
            "Created group {} ({}) with {} permissions",
            group.id, group.name, granted
        );
        Ok(group)
    }

    /// Get a group by ID.
    pub async fn get(&self, id: i64) -> Result<Group> {
        let mut conn = self.db.acquire().await?;
        GroupRepository::get_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("group".to_string()))
    }

    /// Find a group by name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Group>> {
        let mut conn = self.db.acquire().await?;
        GroupRepository::get_by_name(&mut conn, name.trim()).await
    }

    /// List all groups by name.
    pub async fn list(&self) -> Result<Vec<Group>> {
        let mut conn = self.db.acquire().await?;
        GroupRepository::list(&mut conn).await
    }

    /// Rename a group.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Group> {
        let name = validate_name("group", name)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        let group = GroupRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("group".to_string()))?;

        if group.name == name {
            return Ok(group);
        }
        if GroupRepository::get_by_name(&mut tx, &name).await?.is_some() {
            return Err(BoxroomError::Validation(format!(
                "group name {name:?} is already taken"
            )));
        }

        GroupRepository::rename(&mut tx, id, &name).await?;
        tx.commit().await?;

        info!("Renamed group {} to {}", id, name);
        Ok(Group { name, ..group })
    }

    /// Destroy a group and its permissions.
    ///
    /// Returns the number of permissions removed.
    pub async fn destroy(&self, id: i64) -> Result<u64> {
        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        if GroupRepository::get_by_id(&mut tx, id).await?.is_none() {
            return Err(BoxroomError::NotFound("group".to_string()));
        }

        let removed = PermissionRepository::delete_by_group(&mut tx, id).await?;
        GroupRepository::delete(&mut tx, id).await?;
        tx.commit().await?;

        info!("Destroyed group {} and {} permissions", id, removed);
        Ok(removed)
    }
}
