use async_trait::async_trait;
use models::{id_sequence, permission as permission_row, role as role_row, user as user_row, user_role};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, info, instrument};

use crate::auth::domain::{Permissions, Role, User};
use crate::auth::repository::{PermissionCatalog, RoleStore, UserStore};
use crate::clock;
use crate::context::RequestContext;
use crate::errors::{StoreError, StoreResult};
use crate::ids::{RoleId, UserId};
use crate::storage::transaction::{self, Staged};

/// Auth backend over a SeaORM connection. Each write is one transaction.
#[derive(Debug, Clone)]
pub struct SeaOrmAuthStore {
    db: DatabaseConnection,
}

impl SeaOrmAuthStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }

    /// Append catalog entries that are not stored yet. Returns how many
    /// were added.
    pub async fn seed_catalog(&self, ctx: &RequestContext, names: &[String]) -> StoreResult<usize> {
        let added = transaction::write(ctx, self.seed_tx(names)).await?;
        info!(added, "permission catalog seeded");
        Ok(added)
    }

    async fn seed_tx(&self, names: &[String]) -> StoreResult<Staged<usize>> {
        let txn = self.db.begin().await?;
        let added = permission_row::seed(&txn, names).await?;
        Ok(Staged::new(txn, added))
    }

    async fn insert_user(&self, user: User) -> StoreResult<Staged<User>> {
        let role_ids = user.role_ids();
        let txn = self.db.begin().await?;
        ensure_user_name_free(&txn, &user.name, None).await?;
        ensure_roles_exist(&txn, &role_ids).await?;
        let id = id_sequence::next_id(&txn, id_sequence::USERS).await?;
        let now = clock::now().fixed_offset();
        let row = user_row::ActiveModel {
            id: Set(id),
            name: Set(user.name.clone()),
            permissions: Set(encode(&user.permissions)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        user_row::Entity::insert(row)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| StoreError::from(e).for_entity("user", &user.name))?;
        user_role::replace_for_user(&txn, id, &raw_ids(&role_ids)).await?;
        let created = load_user(&txn, UserId(id)).await?;
        Ok(Staged::new(txn, created))
    }

    async fn remove_user(&self, id: UserId) -> StoreResult<Staged<u64>> {
        let txn = self.db.begin().await?;
        let detached = user_role::delete_for_user(&txn, id.get()).await?;
        let res = user_row::Entity::delete_by_id(id.get()).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("user", id));
        }
        Ok(Staged::new(txn, detached))
    }

    async fn overwrite_user(&self, user: &User) -> StoreResult<Staged<User>> {
        let role_ids = user.role_ids();
        let txn = self.db.begin().await?;
        let existing = user_row::Entity::find_by_id(user.id.get())
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user.id))?;
        ensure_user_name_free(&txn, &user.name, Some(user.id)).await?;
        ensure_roles_exist(&txn, &role_ids).await?;
        let mut row = user_row::ActiveModel::from(existing);
        row.name = Set(user.name.clone());
        row.permissions = Set(encode(&user.permissions)?);
        row.updated_at = Set(clock::now().fixed_offset());
        row.update(&txn).await.map_err(|e| StoreError::from(e).for_entity("user", &user.name))?;
        user_role::replace_for_user(&txn, user.id.get(), &raw_ids(&role_ids)).await?;
        let updated = load_user(&txn, user.id).await?;
        Ok(Staged::new(txn, updated))
    }

    async fn insert_role(&self, role: Role) -> StoreResult<Staged<Role>> {
        let user_ids = role.user_ids();
        let txn = self.db.begin().await?;
        ensure_role_name_free(&txn, &role.name, None).await?;
        ensure_users_exist(&txn, &user_ids).await?;
        let id = id_sequence::next_id(&txn, id_sequence::ROLES).await?;
        let now = clock::now().fixed_offset();
        let row = role_row::ActiveModel {
            id: Set(id),
            name: Set(role.name.clone()),
            permissions: Set(encode(&role.permissions)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        role_row::Entity::insert(row)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| StoreError::from(e).for_entity("role", &role.name))?;
        user_role::replace_for_role(&txn, id, &raw_ids(&user_ids)).await?;
        let created = load_role(&txn, RoleId(id)).await?;
        Ok(Staged::new(txn, created))
    }

    async fn remove_role(&self, id: RoleId) -> StoreResult<Staged<u64>> {
        let txn = self.db.begin().await?;
        let detached = user_role::delete_for_role(&txn, id.get()).await?;
        let res = role_row::Entity::delete_by_id(id.get()).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("role", id));
        }
        Ok(Staged::new(txn, detached))
    }

    async fn overwrite_role(&self, role: &Role) -> StoreResult<Staged<Role>> {
        let user_ids = role.user_ids();
        let txn = self.db.begin().await?;
        let existing = role_row::Entity::find_by_id(role.id.get())
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("role", role.id))?;
        ensure_role_name_free(&txn, &role.name, Some(role.id)).await?;
        ensure_users_exist(&txn, &user_ids).await?;
        let mut row = role_row::ActiveModel::from(existing);
        row.name = Set(role.name.clone());
        row.permissions = Set(encode(&role.permissions)?);
        row.updated_at = Set(clock::now().fixed_offset());
        row.update(&txn).await.map_err(|e| StoreError::from(e).for_entity("role", &role.name))?;
        user_role::replace_for_role(&txn, role.id.get(), &raw_ids(&user_ids)).await?;
        let updated = load_role(&txn, role.id).await?;
        Ok(Staged::new(txn, updated))
    }
}

#[async_trait]
impl PermissionCatalog for SeaOrmAuthStore {
    async fn all(&self, ctx: &RequestContext) -> StoreResult<Permissions> {
        let names = ctx.run(async { permission_row::all(&self.db).await.map_err(StoreError::from) }).await?;
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl UserStore for SeaOrmAuthStore {
    #[instrument(skip_all, fields(name = %user.name))]
    async fn add(&self, ctx: &RequestContext, user: User) -> StoreResult<User> {
        user.validate()?;
        let created = transaction::write(ctx, self.insert_user(user)).await?;
        info!(user_id = %created.id, "user added");
        Ok(created)
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn delete(&self, ctx: &RequestContext, user: &User) -> StoreResult<()> {
        let detached = transaction::write(ctx, self.remove_user(user.id)).await?;
        info!(detached, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: UserId) -> StoreResult<User> {
        debug!("get user");
        ctx.run(load_user(&self.db, id)).await
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn update(&self, ctx: &RequestContext, user: &User) -> StoreResult<User> {
        user.validate()?;
        let updated = transaction::write(ctx, self.overwrite_user(user)).await?;
        info!("user updated");
        Ok(updated)
    }
}

#[async_trait]
impl RoleStore for SeaOrmAuthStore {
    #[instrument(skip_all, fields(name = %role.name))]
    async fn add(&self, ctx: &RequestContext, role: Role) -> StoreResult<Role> {
        role.validate()?;
        let created = transaction::write(ctx, self.insert_role(role)).await?;
        info!(role_id = %created.id, "role added");
        Ok(created)
    }

    #[instrument(skip_all, fields(role_id = %role.id))]
    async fn delete(&self, ctx: &RequestContext, role: &Role) -> StoreResult<()> {
        let detached = transaction::write(ctx, self.remove_role(role.id)).await?;
        info!(detached, "role deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: RoleId) -> StoreResult<Role> {
        debug!("get role");
        ctx.run(load_role(&self.db, id)).await
    }

    #[instrument(skip_all, fields(role_id = %role.id))]
    async fn update(&self, ctx: &RequestContext, role: &Role) -> StoreResult<Role> {
        role.validate()?;
        let updated = transaction::write(ctx, self.overwrite_role(role)).await?;
        info!("role updated");
        Ok(updated)
    }
}

fn encode(p: &Permissions) -> StoreResult<String> { Ok(serde_json::to_string(p)?) }

fn decode(raw: &str) -> StoreResult<Permissions> { Ok(serde_json::from_str(raw)?) }

fn raw_ids<T: Copy + Into<i64>>(ids: &[T]) -> Vec<i64> { ids.iter().map(|id| (*id).into()).collect() }

fn shallow_user(m: user_row::Model) -> StoreResult<User> {
    Ok(User { id: UserId(m.id), permissions: decode(&m.permissions)?, name: m.name, roles: Vec::new() })
}

fn shallow_role(m: role_row::Model) -> StoreResult<Role> {
    Ok(Role { id: RoleId(m.id), permissions: decode(&m.permissions)?, name: m.name, users: Vec::new() })
}

async fn load_user<C: ConnectionTrait>(conn: &C, id: UserId) -> StoreResult<User> {
    let row = user_row::Entity::find_by_id(id.get())
        .one(conn)
        .await?
        .ok_or_else(|| StoreError::not_found("user", id))?;
    let role_ids = user_role::role_ids_for_user(conn, row.id).await?;
    let roles = role_row::Entity::find()
        .filter(role_row::Column::Id.is_in(role_ids))
        .order_by_asc(role_row::Column::Id)
        .all(conn)
        .await?;
    let mut user = shallow_user(row)?;
    user.roles = roles.into_iter().map(shallow_role).collect::<StoreResult<_>>()?;
    Ok(user)
}

async fn load_role<C: ConnectionTrait>(conn: &C, id: RoleId) -> StoreResult<Role> {
    let row = role_row::Entity::find_by_id(id.get())
        .one(conn)
        .await?
        .ok_or_else(|| StoreError::not_found("role", id))?;
    let user_ids = user_role::user_ids_for_role(conn, row.id).await?;
    let users = user_row::Entity::find()
        .filter(user_row::Column::Id.is_in(user_ids))
        .order_by_asc(user_row::Column::Id)
        .all(conn)
        .await?;
    let mut role = shallow_role(row)?;
    role.users = users.into_iter().map(shallow_user).collect::<StoreResult<_>>()?;
    Ok(role)
}

async fn ensure_user_name_free<C: ConnectionTrait>(conn: &C, name: &str, except: Option<UserId>) -> StoreResult<()> {
    match user_row::find_by_name(conn, name).await? {
        Some(m) if Some(UserId(m.id)) != except => Err(StoreError::duplicate("user", name)),
        _ => Ok(()),
    }
}

async fn ensure_role_name_free<C: ConnectionTrait>(conn: &C, name: &str, except: Option<RoleId>) -> StoreResult<()> {
    match role_row::find_by_name(conn, name).await? {
        Some(m) if Some(RoleId(m.id)) != except => Err(StoreError::duplicate("role", name)),
        _ => Ok(()),
    }
}

async fn ensure_roles_exist<C: ConnectionTrait>(conn: &C, ids: &[RoleId]) -> StoreResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: Vec<i64> = role_row::Entity::find()
        .filter(role_row::Column::Id.is_in(raw_ids(ids)))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();
    match ids.iter().find(|id| !found.contains(&id.get())) {
        Some(missing) => Err(StoreError::validation(format!("role {missing} does not exist"))),
        None => Ok(()),
    }
}

async fn ensure_users_exist<C: ConnectionTrait>(conn: &C, ids: &[UserId]) -> StoreResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: Vec<i64> = user_row::Entity::find()
        .filter(user_row::Column::Id.is_in(raw_ids(ids)))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();
    match ids.iter().find(|id| !found.contains(&id.get())) {
        Some(missing) => Err(StoreError::validation(format!("user {missing} does not exist"))),
        None => Ok(()),
    }
}
