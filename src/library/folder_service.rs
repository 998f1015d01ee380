//! Folder operations: the root singleton, creation, and the move/copy/destroy
//! cascades.

use std::collections::VecDeque;

use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::access::PermissionRepository;
use crate::db::Database;
use crate::{BoxroomError, Result};

use super::entry::{require_folder_target, EntryRef};
use super::folder::{Folder, FolderRepository, NewFolder, Removal};
use super::storage::{discard_attachments, AttachmentStore};
use super::user_file::{NewUserFile, UserFileRepository};
use super::{validate_name, ROOT_FOLDER_NAME};

/// Folder service for managing the library tree.
pub struct FolderService<'a> {
    db: &'a Database,
    storage: &'a dyn AttachmentStore,
}

impl<'a> FolderService<'a> {
    /// Create a new FolderService.
    pub fn new(db: &'a Database, storage: &'a dyn AttachmentStore) -> Self {
        Self { db, storage }
    }

    /// Get the root folder, creating it on first use.
    pub async fn root(&self) -> Result<Folder> {
        if let Some(id) = self.db.root_cache().get() {
            let mut conn = self.db.acquire().await?;
            match FolderRepository::get_by_id(&mut conn, id).await? {
                Some(folder) if folder.is_root() => return Ok(folder),
                _ => {
                    debug!("Cached root folder {} is gone", id);
                    self.db.root_cache().invalidate();
                }
            }
        }

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        let root = match FolderRepository::get_root(&mut tx).await? {
            Some(root) => root,
            None => {
                let root = FolderRepository::create_root(&mut tx, ROOT_FOLDER_NAME).await?;
                let granted = PermissionRepository::snapshot_for_folder(&mut tx, root.id, None).await?;
                info!("Created root folder {} with {} permissions", root.id, granted);
                root
            }
        };
        tx.commit().await?;

        self.db.root_cache().set(root.id);
        Ok(root)
    }

    /// Get a folder by ID.
    pub async fn get(&self, id: i64) -> Result<Folder> {
        self.find(id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))
    }

    /// Find a folder by ID.
    pub async fn find(&self, id: i64) -> Result<Option<Folder>> {
        let mut conn = self.db.acquire().await?;
        FolderRepository::get_by_id(&mut conn, id).await
    }

    /// Create a folder below an existing parent.
    ///
    /// The new folder gets one permission per group, inherited from the
    /// parent.
    pub async fn create(&self, new_folder: &NewFolder) -> Result<Folder> {
        let name = validate_name("folder", &new_folder.name)?;
        let parent_id = new_folder
            .parent_id
            .ok_or_else(|| BoxroomError::Structural("a folder must have a parent".to_string()))?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;
        let folder = create_in(&mut tx, &name, parent_id).await?;
        tx.commit().await?;

        info!("Created folder {} ({}) in {}", folder.id, folder.name, parent_id);
        Ok(folder)
    }

    /// Rename a folder.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Folder> {
        let name = validate_name("folder", name)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        let folder = FolderRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
        let parent_id = match folder.parent_id {
            Some(parent_id) if !folder.is_root() => parent_id,
            _ => {
                return Err(BoxroomError::Structural(
                    "the root folder cannot be renamed".to_string(),
                ))
            }
        };
        ensure_name_free(&mut tx, parent_id, &name, Some(id)).await?;

        FolderRepository::rename(&mut tx, id, &name).await?;
        let renamed = FolderRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
        tx.commit().await?;

        info!("Renamed folder {} to {}", id, renamed.name);
        Ok(renamed)
    }

    /// Child folders in insertion order.
    pub async fn children(&self, id: i64) -> Result<Vec<Folder>> {
        let mut conn = self.db.acquire().await?;
        if FolderRepository::get_by_id(&mut conn, id).await?.is_none() {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }
        FolderRepository::list_by_parent(&mut conn, id).await
    }

    /// Whether the folder has at least one child folder.
    pub async fn has_children(&self, id: i64) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        if FolderRepository::get_by_id(&mut conn, id).await?.is_none() {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }
        Ok(FolderRepository::count_children(&mut conn, id).await? > 0)
    }

    /// Whether `other_id` lies anywhere below `id`.
    pub async fn parent_of(&self, id: i64, other_id: i64) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        FolderRepository::is_ancestor(&mut conn, id, other_id).await
    }

    /// Folders from the root down to `id`.
    pub async fn path(&self, id: i64) -> Result<Vec<Folder>> {
        let mut conn = self.db.acquire().await?;
        let path = FolderRepository::path(&mut conn, id).await?;
        if path.is_empty() {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }
        Ok(path)
    }

    /// Total bytes of every file in the subtree.
    pub async fn size(&self, id: i64) -> Result<i64> {
        let mut conn = self.db.acquire().await?;
        if FolderRepository::get_by_id(&mut conn, id).await?.is_none() {
            return Err(BoxroomError::NotFound("folder".to_string()));
        }
        FolderRepository::total_size(&mut conn, id).await
    }

    /// Destroy a folder with all its files, sub-folders and permissions.
    pub async fn destroy(&self, id: i64) -> Result<Removal> {
        let (removal, keys) = {
            let _guard = self.db.lock_structure().await;
            let mut tx = self.db.begin().await?;

            let folder = FolderRepository::get_by_id(&mut tx, id)
                .await?
                .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
            if folder.is_root() {
                return Err(BoxroomError::Structural(
                    "the root folder cannot be destroyed".to_string(),
                ));
            }

            let mut removal = Removal::default();
            let mut keys = Vec::new();
            for folder_id in FolderRepository::subtree_post_order(&mut tx, id).await? {
                let removed_keys = UserFileRepository::delete_by_folder(&mut tx, folder_id).await?;
                removal.files += removed_keys.len() as u64;
                keys.extend(removed_keys);
                removal.permissions += PermissionRepository::delete_by_folder(&mut tx, folder_id).await?;
                FolderRepository::delete(&mut tx, folder_id).await?;
                removal.folders += 1;
            }
            tx.commit().await?;

            (removal, keys)
        };

        discard_attachments(self.storage, &keys);

        info!(
            "Destroyed folder {}: {} folders, {} files, {} permissions",
            id, removal.folders, removal.files, removal.permissions
        );
        Ok(removal)
    }

    /// Move a folder into `target`.
    ///
    /// Permissions stay with the folder.
    pub async fn move_to(&self, id: i64, target: Option<EntryRef>) -> Result<Folder> {
        let target_id = require_folder_target(target)?;

        let _guard = self.db.lock_structure().await;
        let mut tx = self.db.begin().await?;

        let folder = FolderRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
        if folder.is_root() {
            return Err(BoxroomError::Structural(
                "the root folder cannot be moved".to_string(),
            ));
        }
        if FolderRepository::get_by_id(&mut tx, target_id).await?.is_none() {
            return Err(BoxroomError::NotFound("target folder".to_string()));
        }
        if target_id == id || FolderRepository::is_ancestor(&mut tx, id, target_id).await? {
            return Err(BoxroomError::Structural(
                "cannot move a folder into itself or one of its sub-folders".to_string(),
            ));
        }
        ensure_name_free(&mut tx, target_id, &folder.name, Some(id)).await?;

        FolderRepository::set_parent(&mut tx, id, target_id).await?;
        let moved = FolderRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
        tx.commit().await?;

        info!("Moved folder {} into {}", id, target_id);
        Ok(moved)
    }

    /// Copy a folder with its whole subtree into `target`.
    ///
    /// The copies get fresh permissions inherited from their new parents.
    pub async fn copy_to(&self, id: i64, target: Option<EntryRef>) -> Result<Folder> {
        let target_id = require_folder_target(target)?;

        let _guard = self.db.lock_structure().await;
        let mut duplicated = Vec::new();
        match self.copy_tree(id, target_id, &mut duplicated).await {
            Ok(copy) => {
                info!(
                    "Copied folder {} into {} as {} ({} attachments)",
                    id,
                    target_id,
                    copy.id,
                    duplicated.len()
                );
                Ok(copy)
            }
            Err(e) => {
                discard_attachments(self.storage, &duplicated);
                Err(e)
            }
        }
    }

    async fn copy_tree(
        &self,
        id: i64,
        target_id: i64,
        duplicated: &mut Vec<String>,
    ) -> Result<Folder> {
        let mut tx = self.db.begin().await?;

        let source = FolderRepository::get_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| BoxroomError::NotFound("folder".to_string()))?;
        if FolderRepository::get_by_id(&mut tx, target_id).await?.is_none() {
            return Err(BoxroomError::NotFound("target folder".to_string()));
        }
        if source.is_root()
            || target_id == id
            || FolderRepository::is_ancestor(&mut tx, id, target_id).await?
        {
            return Err(BoxroomError::Structural(
                "cannot copy a folder into itself or one of its sub-folders".to_string(),
            ));
        }
        ensure_name_free(&mut tx, target_id, &source.name, None).await?;

        let copy = create_in(&mut tx, &source.name, target_id).await?;

        let mut queue = VecDeque::from([(source.id, copy.id)]);
        while let Some((from_id, to_id)) = queue.pop_front() {
            for file in UserFileRepository::list_by_folder(&mut tx, from_id).await? {
                let key = self.storage.duplicate(&file.storage_key)?;
                duplicated.push(key.clone());

                let mut new_file = NewUserFile::new(to_id, file.file_name, key, file.file_size);
                new_file.content_type = file.content_type;
                UserFileRepository::create(&mut tx, &new_file).await?;
            }

            for child in FolderRepository::list_by_parent(&mut tx, from_id).await? {
                let child_copy = create_in(&mut tx, &child.name, to_id).await?;
                queue.push_back((child.id, child_copy.id));
            }
        }

        tx.commit().await?;
        Ok(copy)
    }
}

/// Insert a folder under an existing parent and snapshot its permissions.
async fn create_in(conn: &mut SqliteConnection, name: &str, parent_id: i64) -> Result<Folder> {
    if FolderRepository::get_by_id(conn, parent_id).await?.is_none() {
        return Err(BoxroomError::NotFound("parent folder".to_string()));
    }
    ensure_name_free(conn, parent_id, name, None).await?;

    let folder = FolderRepository::create(conn, name, parent_id).await?;
    PermissionRepository::snapshot_for_folder(conn, folder.id, Some(parent_id)).await?;
    Ok(folder)
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    parent_id: i64,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    if FolderRepository::name_exists(conn, parent_id, name, exclude_id).await? {
        return Err(BoxroomError::Validation(format!(
            "a folder named {name:?} already exists here"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{GroupService, NewGroup, PermissionService, PermissionUpdate};
    use crate::library::{MemoryStorage, UploadRequest, UserFileService};

    async fn folder(service: &FolderService<'_>, name: &str, parent_id: i64) -> Folder {
        service
            .create(&NewFolder::new(name).with_parent(parent_id))
            .await
            .unwrap()
    }

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);

        let first = service.root().await.unwrap();
        let second = service.root().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, ROOT_FOLDER_NAME);
        assert!(first.is_root());
        assert_eq!(count(&db, "folders").await, 1);
        assert_eq!(db.root_cache().get(), Some(first.id));
    }

    #[tokio::test]
    async fn test_root_recreated_after_reset() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);

        service.root().await.unwrap();
        db.reset().await.unwrap();

        let root = service.root().await.unwrap();
        assert!(root.is_root());
        assert_eq!(count(&db, "folders").await, 1);
    }

    #[tokio::test]
    async fn test_create_checks() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();

        let err = service.create(&NewFolder::new("Orphan")).await.unwrap_err();
        assert!(err.is_structural());

        let err = service
            .create(&NewFolder::new("  ").with_parent(root.id))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = service
            .create(&NewFolder::new("Lost").with_parent(9999))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        folder(&service, "Test", root.id).await;
        let err = service
            .create(&NewFolder::new("Test").with_parent(root.id))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_create_inherits_parent_permissions() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let staff = GroupService::new(&db)
            .create(&NewGroup::new("Staff"))
            .await
            .unwrap();

        let permissions = PermissionService::new(&db);
        let root_row = permissions.get(root.id, staff.id).await.unwrap().unwrap();
        permissions
            .update(root_row.id, &PermissionUpdate::new().with_create(true))
            .await
            .unwrap();

        let docs = folder(&service, "Docs", root.id).await;
        let rows = permissions.for_folder(docs.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].can_create);
        assert!(rows[0].can_read);
    }

    #[tokio::test]
    async fn test_rename() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        folder(&service, "B", root.id).await;

        assert_eq!(service.rename(a.id, "A").await.unwrap().name, "A");
        assert_eq!(service.rename(a.id, "C").await.unwrap().name, "C");
        assert!(service.rename(a.id, "B").await.unwrap_err().is_validation());
        assert!(service.rename(a.id, "").await.unwrap_err().is_validation());
        assert!(service
            .rename(root.id, "Top")
            .await
            .unwrap_err()
            .is_structural());
    }

    #[tokio::test]
    async fn test_tree_queries() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let b = folder(&service, "B", a.id).await;

        assert!(service.has_children(root.id).await.unwrap());
        assert!(!service.has_children(b.id).await.unwrap());
        assert!(service.has_children(9999).await.unwrap_err().is_not_found());
        assert!(service.parent_of(root.id, b.id).await.unwrap());
        assert!(!service.parent_of(b.id, root.id).await.unwrap());
        assert!(!service.parent_of(a.id, a.id).await.unwrap());

        let path: Vec<_> = service
            .path(b.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(path, vec![root.id, a.id, b.id]);
        assert!(service.path(9999).await.unwrap_err().is_not_found());
        assert_eq!(service.children(root.id).await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn test_destroy_cascades() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let files = UserFileService::new(&db, &storage);
        GroupService::new(&db)
            .create(&NewGroup::new("Staff"))
            .await
            .unwrap();

        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let b = folder(&service, "B", a.id).await;
        files
            .upload(&UploadRequest::new(a.id, "one.txt", b"1".to_vec()))
            .await
            .unwrap();
        files
            .upload(&UploadRequest::new(b.id, "two.txt", b"22".to_vec()))
            .await
            .unwrap();

        let removal = service.destroy(a.id).await.unwrap();
        assert_eq!(
            removal,
            Removal {
                folders: 2,
                files: 2,
                permissions: 2,
            }
        );
        assert_eq!(count(&db, "folders").await, 1);
        assert_eq!(count(&db, "user_files").await, 0);
        assert!(storage.is_empty());

        let mut conn = db.acquire().await.unwrap();
        assert_eq!(PermissionRepository::count(&mut conn).await.unwrap(), 1);
        assert_eq!(
            PermissionRepository::count_by_folder(&mut conn, a.id)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            PermissionRepository::count_by_folder(&mut conn, root.id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_destroy_root_fails() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        folder(&service, "A", root.id).await;

        assert!(service.destroy(root.id).await.unwrap_err().is_structural());
        assert_eq!(count(&db, "folders").await, 2);
        assert!(service.destroy(9999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_move_checks() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let b = folder(&service, "B", a.id).await;
        let c = folder(&service, "C", root.id).await;
        folder(&service, "B", c.id).await;

        assert!(service.move_to(a.id, None).await.unwrap_err().is_structural());
        assert!(service
            .move_to(a.id, Some(EntryRef::File(1)))
            .await
            .unwrap_err()
            .is_type_mismatch());
        assert!(service
            .move_to(a.id, Some(EntryRef::Folder(9999)))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(service
            .move_to(a.id, Some(EntryRef::Folder(b.id)))
            .await
            .unwrap_err()
            .is_structural());
        assert!(service
            .move_to(a.id, Some(EntryRef::Folder(a.id)))
            .await
            .unwrap_err()
            .is_structural());
        assert!(service
            .move_to(root.id, Some(EntryRef::Folder(c.id)))
            .await
            .unwrap_err()
            .is_structural());
        assert!(service
            .move_to(b.id, Some(EntryRef::Folder(c.id)))
            .await
            .unwrap_err()
            .is_validation());

        let moved = service
            .move_to(a.id, Some(EntryRef::Folder(c.id)))
            .await
            .unwrap();
        assert_eq!(moved.parent_id, Some(c.id));
        assert!(service.parent_of(c.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_duplicates_subtree() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let files = UserFileService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let b = folder(&service, "B", a.id).await;
        let dest = folder(&service, "Dest", root.id).await;
        files
            .upload(&UploadRequest::new(b.id, "deep.txt", b"deep".to_vec()))
            .await
            .unwrap();

        let copy = service
            .copy_to(a.id, Some(EntryRef::Folder(dest.id)))
            .await
            .unwrap();
        assert_eq!(copy.name, "A");
        assert_eq!(copy.parent_id, Some(dest.id));

        let copied_children = service.children(copy.id).await.unwrap();
        assert_eq!(copied_children.len(), 1);
        assert_eq!(copied_children[0].name, "B");
        assert_ne!(copied_children[0].id, b.id);

        let copied_files = files.list(copied_children[0].id).await.unwrap();
        assert_eq!(copied_files.len(), 1);
        assert_eq!(
            files.download(copied_files[0].id).await.unwrap().content,
            b"deep"
        );
        assert_eq!(storage.len(), 2);
        assert_eq!(count(&db, "folders").await, 6);
    }

    #[tokio::test]
    async fn test_copy_checks() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let b = folder(&service, "B", a.id).await;

        assert!(service.copy_to(a.id, None).await.unwrap_err().is_structural());
        assert!(service
            .copy_to(a.id, Some(EntryRef::File(1)))
            .await
            .unwrap_err()
            .is_type_mismatch());
        assert!(service
            .copy_to(a.id, Some(EntryRef::Folder(b.id)))
            .await
            .unwrap_err()
            .is_structural());
        assert!(service
            .copy_to(root.id, Some(EntryRef::Folder(a.id)))
            .await
            .unwrap_err()
            .is_structural());
        assert!(service
            .copy_to(a.id, Some(EntryRef::Folder(root.id)))
            .await
            .unwrap_err()
            .is_validation());
        assert_eq!(count(&db, "folders").await, 3);
    }

    #[tokio::test]
    async fn test_copy_failure_discards_duplicates() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = MemoryStorage::new();
        let service = FolderService::new(&db, &storage);
        let files = UserFileService::new(&db, &storage);
        let root = service.root().await.unwrap();
        let a = folder(&service, "A", root.id).await;
        let dest = folder(&service, "Dest", root.id).await;

        let kept = files
            .upload(&UploadRequest::new(a.id, "kept.txt", b"k".to_vec()))
            .await
            .unwrap();
        let broken = files
            .upload(&UploadRequest::new(a.id, "broken.txt", b"b".to_vec()))
            .await
            .unwrap();
        storage.delete(&broken.storage_key).unwrap();

        let err = service
            .copy_to(a.id, Some(EntryRef::Folder(dest.id)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(service.children(dest.id).await.unwrap().is_empty());
        assert_eq!(storage.len(), 1);
        assert!(storage.contains(&kept.storage_key));
    }
}
