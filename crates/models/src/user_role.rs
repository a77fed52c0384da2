//! Association between users and roles. Both sides of the relation are read
//! from here; neither the user nor the role row stores the other.

use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::{role, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_roles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub role_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation { User, Role }

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::User => Entity::belongs_to(user::Entity)
                .from(Column::UserId)
                .to(user::Column::Id)
                .into(),
            Relation::Role => Entity::belongs_to(role::Entity)
                .from(Column::RoleId)
                .to(role::Column::Id)
                .into(),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub async fn role_ids_for_user<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<Vec<i64>, ModelError> {
    let rows = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_asc(Column::RoleId)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|r| r.role_id).collect())
}

pub async fn user_ids_for_role<C: ConnectionTrait>(conn: &C, role_id: i64) -> Result<Vec<i64>, ModelError> {
    let rows = Entity::find()
        .filter(Column::RoleId.eq(role_id))
        .order_by_asc(Column::UserId)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|r| r.user_id).collect())
}

/// Replace every membership of `user_id` with `role_ids`.
pub async fn replace_for_user<C: ConnectionTrait>(conn: &C, user_id: i64, role_ids: &[i64]) -> Result<(), ModelError> {
    delete_for_user(conn, user_id).await?;
    let links: Vec<ActiveModel> = role_ids
        .iter()
        .map(|role_id| ActiveModel { user_id: Set(user_id), role_id: Set(*role_id) })
        .collect();
    insert_links(conn, links).await
}

/// Replace every membership of `role_id` with `user_ids`.
pub async fn replace_for_role<C: ConnectionTrait>(conn: &C, role_id: i64, user_ids: &[i64]) -> Result<(), ModelError> {
    delete_for_role(conn, role_id).await?;
    let links: Vec<ActiveModel> = user_ids
        .iter()
        .map(|user_id| ActiveModel { user_id: Set(*user_id), role_id: Set(role_id) })
        .collect();
    insert_links(conn, links).await
}

pub async fn delete_for_user<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<u64, ModelError> {
    let res = Entity::delete_many().filter(Column::UserId.eq(user_id)).exec(conn).await?;
    Ok(res.rows_affected)
}

pub async fn delete_for_role<C: ConnectionTrait>(conn: &C, role_id: i64) -> Result<u64, ModelError> {
    let res = Entity::delete_many().filter(Column::RoleId.eq(role_id)).exec(conn).await?;
    Ok(res.rows_affected)
}

async fn insert_links<C: ConnectionTrait>(conn: &C, links: Vec<ActiveModel>) -> Result<(), ModelError> {
    if links.is_empty() {
        return Ok(());
    }
    Entity::insert_many(links).exec_without_returning(conn).await?;
    Ok(())
}
