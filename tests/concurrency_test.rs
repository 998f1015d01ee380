//! Concurrency tests for Boxroom.
//!
//! Structural mutations are serialized, so racing operations must never
//! leave the tree in a state a sequential run could not produce.

mod common;

use boxroom::{
    EntryRef, FolderService, GroupService, NewFolder, PermissionFlags, PermissionService,
    PermissionUpdate,
};
use common::TestLibrary;

/// Test that racing moves of two siblings into each other cannot form a cycle.
#[tokio::test]
async fn test_concurrent_cross_moves() {
    let lib = TestLibrary::new().await;
    let a = lib.root_folder("a").await;
    let b = lib.root_folder("b").await;

    let mut handles = Vec::new();
    for (from, to) in [(a.id, b.id), (b.id, a.id)] {
        let db = lib.db.clone();
        let storage = lib.storage.clone();
        handles.push(tokio::spawn(async move {
            FolderService::new(&db, &*storage)
                .move_to(from, Some(EntryRef::Folder(to)))
                .await
        }));
    }

    let mut moved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => moved += 1,
            Err(e) => assert!(e.is_structural(), "unexpected error: {e}"),
        }
    }
    assert_eq!(moved, 1, "exactly one move should win");

    let folders = lib.folders();
    let a_parent = folders.get(a.id).await.unwrap().parent_id;
    let b_parent = folders.get(b.id).await.unwrap().parent_id;
    assert!(a_parent == Some(b.id) || b_parent == Some(a.id));
    assert!(!(a_parent == Some(b.id) && b_parent == Some(a.id)));
}

/// Test that concurrent creation of the same name yields a single folder.
#[tokio::test]
async fn test_concurrent_same_name_creation() {
    let lib = TestLibrary::new().await;
    let root_id = lib.root().await.id;

    const NUM_TASKS: usize = 8;

    let mut handles = Vec::new();
    for _ in 0..NUM_TASKS {
        let db = lib.db.clone();
        let storage = lib.storage.clone();
        handles.push(tokio::spawn(async move {
            FolderService::new(&db, &*storage)
                .create(&NewFolder::new("Shared").with_parent(root_id))
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(e.is_validation(), "unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(lib.count("folders").await, 2);
}

/// Test that concurrent first calls to `root()` create a single root.
#[tokio::test]
async fn test_concurrent_root_initialization() {
    let lib = TestLibrary::new().await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let db = lib.db.clone();
        let storage = lib.storage.clone();
        handles.push(tokio::spawn(async move {
            FolderService::new(&db, &*storage).root().await.map(|f| f.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(lib.count("folders").await, 1);
}

/// Test that group and permission edits racing folder creation on a file
/// database never surface "database is locked".
#[tokio::test]
async fn test_concurrent_writers_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let lib = TestLibrary::on_disk(dir.path()).await;
    let root_id = lib.root().await.id;

    const NUM_TASKS: usize = 20;

    let mut groups = Vec::new();
    for i in 0..NUM_TASKS {
        groups.push(lib.group(&format!("group{i}")).await);
    }
    let permission_ids: Vec<i64> = PermissionService::new(&lib.db)
        .for_folder(root_id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mut handles = Vec::new();
    for (i, group) in groups.into_iter().enumerate() {
        let db = lib.db.clone();
        handles.push(tokio::spawn(async move {
            GroupService::new(&db)
                .rename(group.id, &format!("renamed{i}"))
                .await
                .map(|_| ())
        }));
    }
    for id in permission_ids {
        let db = lib.db.clone();
        handles.push(tokio::spawn(async move {
            PermissionService::new(&db)
                .update(id, &PermissionUpdate::from_flags(PermissionFlags::FULL))
                .await
                .map(|_| ())
        }));
    }
    for i in 0..NUM_TASKS {
        let db = lib.db.clone();
        let storage = lib.storage.clone();
        handles.push(tokio::spawn(async move {
            FolderService::new(&db, &*storage)
                .create(&NewFolder::new(format!("folder{i}")).with_parent(root_id))
                .await
                .map(|_| ())
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            panic!("writer failed: {e}");
        }
    }

    assert_eq!(lib.count("folders").await, 1 + NUM_TASKS as i64);
    assert_eq!(lib.count("user_groups").await, NUM_TASKS as i64);
    let full: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM permissions WHERE can_create AND can_update AND can_delete",
    )
    .fetch_one(lib.db.pool())
    .await
    .unwrap();
    // Rows on the root were granted full access; new folders inherit
    // whatever the root held when they were created.
    assert!(full >= NUM_TASKS as i64);
}
