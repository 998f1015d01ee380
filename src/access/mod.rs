//! Access control for the Boxroom library.
//!
//! Groups are the principals; every folder carries one [`Permission`] row
//! per group with create/read/update/delete flags.

mod group;
mod permission;

pub use group::{Group, GroupRepository, GroupService, NewGroup};
pub use permission::{
    Action, Permission, PermissionFlags, PermissionRepository, PermissionService,
    PermissionUpdate,
};
