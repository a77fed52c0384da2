use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ModelError;

/// One entry of the global permission catalog. `position` fixes the listing
/// order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub position: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Append the names not yet in the catalog, in the given order. Returns how
/// many were added.
pub async fn seed<C: ConnectionTrait>(conn: &C, names: &[String]) -> Result<usize, ModelError> {
    let existing = Entity::find().all(conn).await?;
    let mut known: Vec<String> = existing.iter().map(|p| p.name.clone()).collect();
    let mut position = existing.iter().map(|p| p.position).max().unwrap_or(0);
    let mut added = 0;
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::Validation("permission name required".into()));
        }
        if known.iter().any(|k| k == name) {
            continue;
        }
        position += 1;
        let am = ActiveModel { name: Set(name.to_owned()), position: Set(position) };
        Entity::insert(am).exec_without_returning(conn).await?;
        known.push(name.to_owned());
        added += 1;
    }
    debug!(added, total = known.len(), "permission catalog seeded");
    Ok(added)
}

/// Catalog names in position order.
pub async fn all<C: ConnectionTrait>(conn: &C) -> Result<Vec<String>, ModelError> {
    let rows = Entity::find().order_by_asc(Column::Position).all(conn).await?;
    Ok(rows.into_iter().map(|p| p.name).collect())
}
