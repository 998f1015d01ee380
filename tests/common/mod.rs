//! Test helpers for library integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use boxroom::{
    Database, Folder, FolderService, Group, GroupService, MemoryStorage, NewFolder, NewGroup,
    UploadRequest, UserFile, UserFileService,
};

/// A fresh in-memory library with its attachment store.
pub struct TestLibrary {
    pub db: Arc<Database>,
    pub storage: Arc<MemoryStorage>,
}

impl TestLibrary {
    /// Open an empty library.
    pub async fn new() -> Self {
        Self {
            db: Arc::new(Database::open_in_memory().await.unwrap()),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    /// Open an empty library backed by a database file in `dir`.
    pub async fn on_disk(dir: &Path) -> Self {
        Self {
            db: Arc::new(Database::open(dir.join("boxroom.db")).await.unwrap()),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn folders(&self) -> FolderService<'_> {
        FolderService::new(&self.db, &*self.storage)
    }

    pub fn files(&self) -> UserFileService<'_> {
        UserFileService::new(&self.db, &*self.storage)
    }

    pub async fn root(&self) -> Folder {
        self.folders().root().await.unwrap()
    }

    /// Create a folder under `parent_id`.
    pub async fn folder(&self, name: &str, parent_id: i64) -> Folder {
        self.folders()
            .create(&NewFolder::new(name).with_parent(parent_id))
            .await
            .unwrap()
    }

    /// Create a folder directly under the root.
    pub async fn root_folder(&self, name: &str) -> Folder {
        let root = self.root().await;
        self.folder(name, root.id).await
    }

    /// Upload a file with `size` bytes of content.
    pub async fn file(&self, name: &str, folder_id: i64, size: usize) -> UserFile {
        self.files()
            .upload(&UploadRequest::new(folder_id, name, vec![b'x'; size]))
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str) -> Group {
        GroupService::new(&self.db)
            .create(&NewGroup::new(name))
            .await
            .unwrap()
    }

    /// Row count of a table.
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}
