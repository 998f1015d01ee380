//! Database schema definitions for Boxroom.
//!
//! Each entry is applied once, in order, and recorded in `schema_version`.
//! Foreign keys carry no ON DELETE actions: every cascade is performed
//! explicitly by the library, and a forgotten step fails the transaction.

/// All migrations in order.
pub const MIGRATIONS: &[&str] = &[
    // v1: Groups, folders, files and permissions
    r#"
-- Access-control principals
CREATE TABLE user_groups (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- Folder tree; the root is the only row without a parent
CREATE TABLE folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL CHECK (length(trim(name)) > 0),
    parent_id   INTEGER REFERENCES folders(id),
    is_root     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(parent_id, name),
    CHECK (is_root = 1 OR parent_id IS NOT NULL),
    CHECK (is_root = 0 OR parent_id IS NULL)
);

CREATE UNIQUE INDEX idx_folders_single_root ON folders(is_root) WHERE is_root = 1;
CREATE INDEX idx_folders_parent_id ON folders(parent_id);

-- Uploaded files; bytes live in the attachment store under storage_key
CREATE TABLE user_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id     INTEGER NOT NULL REFERENCES folders(id),
    file_name     TEXT NOT NULL CHECK (length(trim(file_name)) > 0),
    content_type  TEXT,
    file_size     INTEGER NOT NULL DEFAULT 0,
    storage_key   TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(folder_id, file_name)
);

CREATE INDEX idx_user_files_folder_id ON user_files(folder_id);

-- Per (folder, group) capability flags
CREATE TABLE permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id   INTEGER NOT NULL REFERENCES folders(id),
    group_id    INTEGER NOT NULL REFERENCES user_groups(id),
    can_create  INTEGER NOT NULL DEFAULT 0,
    can_read    INTEGER NOT NULL DEFAULT 1,
    can_update  INTEGER NOT NULL DEFAULT 0,
    can_delete  INTEGER NOT NULL DEFAULT 0,
    UNIQUE(folder_id, group_id)
);

CREATE INDEX idx_permissions_group_id ON permissions(group_id);
"#,
];
