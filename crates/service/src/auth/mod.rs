//! Auth storage: users, roles and the permission catalog.
//!
//! `domain` holds the value types, `repository` the store contracts and the
//! [`AuthStore`] aggregate, `repo` the backends.

pub mod domain;
pub mod repository;
pub mod repo;

pub use domain::{Permission, Permissions, Role, User};
pub use repository::{AuthStore, PermissionCatalog, RoleStore, UserStore};
