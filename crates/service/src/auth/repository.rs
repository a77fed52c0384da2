use std::sync::Arc;

use async_trait::async_trait;

use super::domain::{Permissions, Role, User};
use crate::context::RequestContext;
use crate::errors::StoreResult;
use crate::ids::{RoleId, UserId};

/// The global list of permissions the system knows about.
#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// Every supported permission in insertion order.
    async fn all(&self, ctx: &RequestContext) -> StoreResult<Permissions>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Store a new user. The ID is assigned here; whatever the caller put in
    /// `user.id` is ignored.
    async fn add(&self, ctx: &RequestContext, user: User) -> StoreResult<User>;
    /// Remove the user with `user.id` and drop all of its role memberships.
    async fn delete(&self, ctx: &RequestContext, user: &User) -> StoreResult<()>;
    async fn get(&self, ctx: &RequestContext, id: UserId) -> StoreResult<User>;
    /// Overwrite name, permissions and memberships of an existing user.
    async fn update(&self, ctx: &RequestContext, user: &User) -> StoreResult<User>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn add(&self, ctx: &RequestContext, role: Role) -> StoreResult<Role>;
    async fn delete(&self, ctx: &RequestContext, role: &Role) -> StoreResult<()>;
    async fn get(&self, ctx: &RequestContext, id: RoleId) -> StoreResult<Role>;
    async fn update(&self, ctx: &RequestContext, role: &Role) -> StoreResult<Role>;
}

/// Aggregate handle over the three auth stores. Each part can come from a
/// different backend.
#[derive(Clone)]
pub struct AuthStore {
    pub permissions: Arc<dyn PermissionCatalog>,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
}

impl AuthStore {
    pub fn new(
        permissions: Arc<dyn PermissionCatalog>,
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
    ) -> Self {
        Self { permissions, users, roles }
    }

    /// Use one backend for all three parts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: PermissionCatalog + UserStore + RoleStore + 'static,
    {
        Self {
            permissions: backend.clone(),
            users: backend.clone(),
            roles: backend,
        }
    }

    /// Ordered, de-duplicated union of the user's direct grants and the
    /// grants of every role it belongs to.
    pub async fn effective_permissions(&self, ctx: &RequestContext, id: UserId) -> StoreResult<Permissions> {
        let user = self.users.get(ctx, id).await?;
        Ok(user.effective_permissions())
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore").finish_non_exhaustive()
    }
}
