//! Per-entity ID counters.
//!
//! Identifiers are handed out from a counter row instead of a database
//! auto-increment so the same non-reuse guarantee holds on every backend,
//! and the increment happens inside the caller's write transaction.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ConnectionTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

pub const USERS: &str = "users";
pub const ROLES: &str = "roles";
pub const EXPLORATIONS: &str = "explorations";
pub const DASHBOARDS: &str = "dashboards";
pub const ALL: &[&str] = &[USERS, ROLES, EXPLORATIONS, DASHBOARDS];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "id_sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub next_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Insert a counter row starting at 1 for every name that has none.
pub async fn ensure<C: ConnectionTrait>(conn: &C, names: &[&str]) -> Result<(), ModelError> {
    for name in names {
        if Entity::find_by_id(ToString::to_string(*name)).one(conn).await?.is_none() {
            let am = ActiveModel { name: Set(ToString::to_string(*name)), next_id: Set(1) };
            Entity::insert(am).exec_without_returning(conn).await?;
        }
    }
    Ok(())
}

/// Take the next identifier for `name`.
///
/// The row is bumped with a single `UPDATE ... SET next_id = next_id + 1`
/// before it is read back, so concurrent writers serialize on the row lock.
pub async fn next_id<C: ConnectionTrait>(conn: &C, name: &str) -> Result<i64, ModelError> {
    let res = Entity::update_many()
        .col_expr(Column::NextId, Expr::col(Column::NextId).add(1))
        .filter(Column::Name.eq(name))
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Err(ModelError::Db(format!("id sequence {name} missing; bootstrap the schema first")));
    }
    let row = Entity::find_by_id(name.to_owned())
        .one(conn)
        .await?
        .ok_or_else(|| ModelError::Db(format!("id sequence {name} vanished")))?;
    Ok(row.next_id - 1)
}
