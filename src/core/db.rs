use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
    SqlErr,
};

use crate::models::{comment, post, user};

pub async fn connect(database_url: &str) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);

    let db = Database::connect(options).await?;
    tracing::info!("connected to {:?} database", db.get_database_backend());
    Ok(db)
}

/// Creates any missing tables. Parents first so the foreign keys resolve.
pub async fn init_schema(db: &DatabaseConnection) -> anyhow::Result<()> {
    create_table(db, user::Entity).await?;
    create_table(db, post::Entity).await?;
    create_table(db, comment::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> anyhow::Result<()> {
    let table = entity.table_name().to_owned();
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    tracing::debug!("ensured table {}", table);
    Ok(())
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Single-connection in-memory SQLite with the schema in place.
#[cfg(test)]
pub(crate) async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    init_schema(&db).await.unwrap();
    db
}
