#![cfg(test)]
use configs::DatabaseConfig;
use sea_orm::DatabaseConnection;

/// Fresh in-memory SQLite database with every table created. Each call gets
/// its own database, so tests never see each other's rows.
pub async fn get_db() -> Result<DatabaseConnection, anyhow::Error> {
    let db = models::db::connect_with_config(&DatabaseConfig::sqlite_memory()).await?;
    models::db::bootstrap_schema(&db).await?;
    Ok(db)
}

#[tokio::test]
async fn seaorm_auth_round_trip() -> Result<(), anyhow::Error> {
    use crate::auth::repo::SeaOrmAuthStore;
    use crate::auth::{Role, RoleStore, User, UserStore};
    use crate::context::RequestContext;

    let store = SeaOrmAuthStore::new(get_db().await?);
    let ctx = RequestContext::background();
    let admin = RoleStore::add(&store, &ctx, Role::new("admin").with_permissions(["read", "write"])).await?;
    let alice = UserStore::add(&store, &ctx, User::new("alice").with_roles([admin.clone()])).await?;
    assert_eq!(alice.roles.len(), 1);
    assert!(alice.roles[0].users.is_empty());
    let admin = RoleStore::get(&store, &ctx, admin.id).await?;
    assert_eq!(admin.users.len(), 1);
    assert_eq!(admin.users[0].name, "alice");
    Ok(())
}

#[tokio::test]
async fn unique_violation_is_attributed_to_its_entity() -> Result<(), anyhow::Error> {
    use crate::errors::{ErrorKind, StoreError};
    use models::user as user_row;
    use sea_orm::{EntityTrait, Set};

    let db = get_db().await?;
    let now = crate::clock::now().fixed_offset();
    let row = |id: i64| user_row::ActiveModel {
        id: Set(id),
        name: Set("alice".into()),
        permissions: Set("[]".into()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    user_row::Entity::insert(row(1)).exec_without_returning(&db).await?;
    let err = user_row::Entity::insert(row(2))
        .exec_without_returning(&db)
        .await
        .map_err(|e| StoreError::from(e).for_entity("user", "alice"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(err.to_string(), "user already exists: alice");
    Ok(())
}
