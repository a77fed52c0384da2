use std::time::Duration;

use configs::DatabaseConfig;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

use crate::errors::ModelError;
use crate::{dashboard, exploration, id_sequence, permission, role, user, user_role};

pub async fn connect_with_config(cfg: &DatabaseConfig) -> Result<DatabaseConnection, ModelError> {
    let mut opt = ConnectOptions::new(cfg.url.clone());
    opt.max_connections(cfg.max_connections)
        .min_connections(cfg.min_connections)
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(cfg.max_lifetime_secs))
        .sqlx_logging(cfg.sqlx_logging);
    // Every connection to an in-memory SQLite URL opens a fresh database.
    if cfg.is_sqlite_memory() {
        opt.max_connections(1).min_connections(1);
    }
    let db = Database::connect(opt).await?;
    info!(backend = ?db.get_database_backend(), "database connected");
    Ok(db)
}

/// Create every table that does not exist yet and seed the ID sequences.
/// Safe to run on every start.
pub async fn bootstrap_schema(db: &DatabaseConnection) -> Result<(), ModelError> {
    let schema = Schema::new(db.get_database_backend());
    create_table(db, &schema, id_sequence::Entity).await?;
    create_table(db, &schema, permission::Entity).await?;
    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, role::Entity).await?;
    create_table(db, &schema, user_role::Entity).await?;
    create_table(db, &schema, exploration::Entity).await?;
    create_table(db, &schema, dashboard::Entity).await?;
    id_sequence::ensure(db, id_sequence::ALL).await?;
    info!("schema bootstrapped");
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<(), ModelError> {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}
