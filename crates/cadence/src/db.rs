//! Database connection utilities.

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Configure SQLite-specific pragmas for better performance and concurrency.
///
/// This sets:
/// - `journal_mode=WAL` - Write-ahead logging for better concurrent access
/// - `busy_timeout=5000` - Wait up to 5 seconds for locks instead of failing immediately
/// - `synchronous=NORMAL` - Good balance of safety and performance with WAL
/// - `foreign_keys=ON` - Enforce the job/step cascades
async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::{ConnectionTrait, Statement};

    // Enable WAL mode for better concurrency (readers don't block writers)
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA journal_mode=WAL".to_string(),
    ))
    .await?;

    // Wait up to 5 seconds for locks instead of failing immediately
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA busy_timeout=5000".to_string(),
    ))
    .await?;

    // NORMAL synchronous is safe with WAL and faster than FULL
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA synchronous=NORMAL".to_string(),
    ))
    .await?;

    // SQLite leaves foreign keys off unless asked
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys=ON".to_string(),
    ))
    .await?;

    Ok(())
}

/// Establish a connection to the database.
///
/// For SQLite databases, this automatically configures WAL journal mode, a
/// 5 second busy timeout, NORMAL synchronous mode, and foreign key
/// enforcement.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    // Configure SQLite-specific settings
    if database_url.starts_with("sqlite://") {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Establish a connection to the database and run all pending migrations.
///
/// This is the recommended way to initialize the database: it ensures the
/// schema is always up-to-date before any collection writes to it.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations fail.
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = Database::connect(database_url).await?;

    // Configure SQLite-specific settings
    if database_url.starts_with("sqlite://") {
        configure_sqlite(&db).await?;
    }

    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
