use std::time::Duration;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

use crate::authz::store::PolicyStore;

/// Migrated temp-file SQLite database for unit tests
pub(crate) struct TestDb {
    pub store: PolicyStore,
    _temp_file: NamedTempFile,
}

impl TestDb {
    pub async fn new() -> Self {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            store: PolicyStore::new(connection, Duration::from_secs(5)),
            _temp_file: temp_file,
        }
    }
}
