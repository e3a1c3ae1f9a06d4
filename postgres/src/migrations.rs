use sqlx::PgPool;

/// Applies pending document store migrations.
///
/// `pool` must come from [`crate::db::connect_document_store`].
pub async fn migrate_document_store(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("./migrations");
    migrator.run(pool).await?;

    Ok(())
}
