use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::auth::domain::{Permission, Permissions, Role, User};
use crate::auth::repository::{PermissionCatalog, RoleStore, UserStore};
use crate::context::RequestContext;
use crate::errors::{StoreError, StoreResult};
use crate::ids::{RoleId, UserId};
use crate::storage::StateCell;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Grantee {
    name: String,
    permissions: Permissions,
}

/// Everything the auth backend keeps. Memberships are stored once, as
/// `(user, role)` pairs, and both views are derived from them on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthState {
    catalog: Permissions,
    users: BTreeMap<UserId, Grantee>,
    roles: BTreeMap<RoleId, Grantee>,
    memberships: BTreeSet<(UserId, RoleId)>,
    last_user_id: i64,
    last_role_id: i64,
}

impl AuthState {
    fn seed_catalog<I, P>(&mut self, names: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        let mut added = 0;
        for p in names {
            let p: Permission = p.into();
            if p.as_str().trim().is_empty() {
                return Err(StoreError::validation("permission name required"));
            }
            if self.catalog.contains(p.as_str()) {
                warn!(permission = %p, "permission already in catalog");
                continue;
            }
            self.catalog.push(p);
            added += 1;
        }
        Ok(added)
    }

    fn user_view(&self, id: UserId) -> StoreResult<User> {
        let g = self.users.get(&id).ok_or_else(|| StoreError::not_found("user", id))?;
        let roles = self
            .memberships
            .iter()
            .filter(|(u, _)| *u == id)
            .filter_map(|(_, r)| self.roles.get(r).map(|rg| Role {
                id: *r,
                name: rg.name.clone(),
                permissions: rg.permissions.clone(),
                users: Vec::new(),
            }))
            .collect();
        Ok(User { id, name: g.name.clone(), permissions: g.permissions.clone(), roles })
    }

    fn role_view(&self, id: RoleId) -> StoreResult<Role> {
        let g = self.roles.get(&id).ok_or_else(|| StoreError::not_found("role", id))?;
        // The set is ordered by user first, so members come out by ascending ID.
        let users = self
            .memberships
            .iter()
            .filter(|(_, r)| *r == id)
            .filter_map(|(u, _)| self.users.get(u).map(|ug| User {
                id: *u,
                name: ug.name.clone(),
                permissions: ug.permissions.clone(),
                roles: Vec::new(),
            }))
            .collect();
        Ok(Role { id, name: g.name.clone(), permissions: g.permissions.clone(), users })
    }

    fn ensure_user_name_free(&self, name: &str, except: Option<UserId>) -> StoreResult<()> {
        if self.users.iter().any(|(id, g)| g.name == name && Some(*id) != except) {
            return Err(StoreError::duplicate("user", name));
        }
        Ok(())
    }

    fn ensure_role_name_free(&self, name: &str, except: Option<RoleId>) -> StoreResult<()> {
        if self.roles.iter().any(|(id, g)| g.name == name && Some(*id) != except) {
            return Err(StoreError::duplicate("role", name));
        }
        Ok(())
    }

    fn ensure_roles_exist(&self, ids: &[RoleId]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.roles.contains_key(*id)) {
            Some(missing) => Err(StoreError::validation(format!("role {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn ensure_users_exist(&self, ids: &[UserId]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.users.contains_key(*id)) {
            Some(missing) => Err(StoreError::validation(format!("user {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn set_user_roles(&mut self, user: UserId, roles: &[RoleId]) {
        self.memberships.retain(|(u, _)| *u != user);
        self.memberships.extend(roles.iter().map(|r| (user, *r)));
    }

    fn set_role_users(&mut self, role: RoleId, users: &[UserId]) {
        self.memberships.retain(|(_, r)| *r != role);
        self.memberships.extend(users.iter().map(|u| (*u, role)));
    }
}

/// Auth backend holding its state in process, optionally mirrored to a JSON
/// snapshot file.
#[derive(Debug)]
pub struct MemoryAuthStore {
    cell: StateCell<AuthState>,
}

impl MemoryAuthStore {
    /// Empty store whose catalog holds `catalog` (repeats collapsed).
    pub fn new<I, P>(catalog: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        let mut state = AuthState::default();
        state.seed_catalog(catalog)?;
        Ok(Self { cell: StateCell::from_state(state) })
    }

    /// Load (or create) the snapshot at `path`, then append catalog entries
    /// it does not know yet.
    pub async fn open<I, P>(catalog: I, path: impl Into<PathBuf>) -> StoreResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        let cell: StateCell<AuthState> = StateCell::open(path).await?;
        let catalog: Vec<Permission> = catalog.into_iter().map(Into::into).collect();
        let added = cell
            .update(&RequestContext::background(), move |s| s.seed_catalog(catalog))
            .await?;
        info!(added, "auth snapshot opened");
        Ok(Self { cell })
    }
}

#[async_trait]
impl PermissionCatalog for MemoryAuthStore {
    async fn all(&self, ctx: &RequestContext) -> StoreResult<Permissions> {
        self.cell.read(ctx, |s| Ok(s.catalog.clone())).await
    }
}

#[async_trait]
impl UserStore for MemoryAuthStore {
    #[instrument(skip_all, fields(name = %user.name))]
    async fn add(&self, ctx: &RequestContext, user: User) -> StoreResult<User> {
        user.validate()?;
        let role_ids = user.role_ids();
        let created = self
            .cell
            .update(ctx, move |s| {
                s.ensure_user_name_free(&user.name, None)?;
                s.ensure_roles_exist(&role_ids)?;
                s.last_user_id += 1;
                let id = UserId(s.last_user_id);
                s.users.insert(id, Grantee { name: user.name, permissions: user.permissions });
                s.set_user_roles(id, &role_ids);
                s.user_view(id)
            })
            .await?;
        info!(user_id = %created.id, "user added");
        Ok(created)
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn delete(&self, ctx: &RequestContext, user: &User) -> StoreResult<()> {
        let id = user.id;
        self.cell
            .update(ctx, move |s| {
                s.users.remove(&id).ok_or_else(|| StoreError::not_found("user", id))?;
                s.memberships.retain(|(u, _)| *u != id);
                Ok(())
            })
            .await?;
        info!("user deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: UserId) -> StoreResult<User> {
        debug!("get user");
        self.cell.read(ctx, |s| s.user_view(id)).await
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn update(&self, ctx: &RequestContext, user: &User) -> StoreResult<User> {
        user.validate()?;
        let id = user.id;
        let role_ids = user.role_ids();
        let name = user.name.clone();
        let permissions = user.permissions.clone();
        let updated = self
            .cell
            .update(ctx, move |s| {
                if !s.users.contains_key(&id) {
                    return Err(StoreError::not_found("user", id));
                }
                s.ensure_user_name_free(&name, Some(id))?;
                s.ensure_roles_exist(&role_ids)?;
                s.users.insert(id, Grantee { name, permissions });
                s.set_user_roles(id, &role_ids);
                s.user_view(id)
            })
            .await?;
        info!("user updated");
        Ok(updated)
    }
}

#[async_trait]
impl RoleStore for MemoryAuthStore {
    #[instrument(skip_all, fields(name = %role.name))]
    async fn add(&self, ctx: &RequestContext, role: Role) -> StoreResult<Role> {
        role.validate()?;
        let user_ids = role.user_ids();
        let created = self
            .cell
            .update(ctx, move |s| {
                s.ensure_role_name_free(&role.name, None)?;
                s.ensure_users_exist(&user_ids)?;
                s.last_role_id += 1;
                let id = RoleId(s.last_role_id);
                s.roles.insert(id, Grantee { name: role.name, permissions: role.permissions });
                s.set_role_users(id, &user_ids);
                s.role_view(id)
            })
            .await?;
        info!(role_id = %created.id, "role added");
        Ok(created)
    }

    #[instrument(skip_all, fields(role_id = %role.id))]
    async fn delete(&self, ctx: &RequestContext, role: &Role) -> StoreResult<()> {
        let id = role.id;
        self.cell
            .update(ctx, move |s| {
                s.roles.remove(&id).ok_or_else(|| StoreError::not_found("role", id))?;
                s.memberships.retain(|(_, r)| *r != id);
                Ok(())
            })
            .await?;
        info!("role deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: RoleId) -> StoreResult<Role> {
        debug!("get role");
        self.cell.read(ctx, |s| s.role_view(id)).await
    }

    #[instrument(skip_all, fields(role_id = %role.id))]
    async fn update(&self, ctx: &RequestContext, role: &Role) -> StoreResult<Role> {
        role.validate()?;
        let id = role.id;
        let user_ids = role.user_ids();
        let name = role.name.clone();
        let permissions = role.permissions.clone();
        let updated = self
            .cell
            .update(ctx, move |s| {
                if !s.roles.contains_key(&id) {
                    return Err(StoreError::not_found("role", id));
                }
                s.ensure_role_name_free(&name, Some(id))?;
                s.ensure_users_exist(&user_ids)?;
                s.roles.insert(id, Grantee { name, permissions });
                s.set_role_users(id, &user_ids);
                s.role_view(id)
            })
            .await?;
        info!("role updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn store() -> MemoryAuthStore {
        MemoryAuthStore::new(["read", "write", "read", "admin"]).unwrap()
    }

    #[tokio::test]
    async fn catalog_collapses_repeats_in_order() {
        let s = store();
        let all = s.all(&RequestContext::background()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["read", "write", "admin"]);
    }

    #[test]
    fn catalog_rejects_empty_names() {
        let err = MemoryAuthStore::new(["read", " "]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let s = store();
        let ctx = RequestContext::background();
        let a = UserStore::add(&s, &ctx, User::new("a")).await.unwrap();
        UserStore::delete(&s, &ctx, &a).await.unwrap();
        let b = UserStore::add(&s, &ctx, User::new("b")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn failed_add_keeps_counter() {
        let s = store();
        let ctx = RequestContext::background();
        let missing = Role { id: RoleId(99), ..Role::new("ghost") };
        let err = UserStore::add(&s, &ctx, User::new("a").with_roles([missing])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let a = UserStore::add(&s, &ctx, User::new("a")).await.unwrap();
        assert_eq!(a.id, UserId(1));
    }

    #[tokio::test]
    async fn rename_to_own_name_is_not_a_duplicate() {
        let s = store();
        let ctx = RequestContext::background();
        let r = RoleStore::add(&s, &ctx, Role::new("ops")).await.unwrap();
        let again = RoleStore::update(&s, &ctx, &r.clone().with_permissions(["read"])).await.unwrap();
        assert_eq!(again.name, "ops");
        assert_eq!(again.permissions.len(), 1);
    }
}
