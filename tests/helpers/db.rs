use std::sync::Arc;
use std::time::Duration;

use rolegate::authz::{Enforcer, PolicyAdmin, PolicyStore, ReloadPolicy};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn store(&self) -> PolicyStore {
        PolicyStore::new(self.connection.clone(), Duration::from_secs(5))
    }

    /// Admin service over this database, sharing one enforcer.
    pub fn admin(&self, reload: ReloadPolicy) -> PolicyAdmin {
        let store = self.store();
        let enforcer = Arc::new(Enforcer::new(store.clone(), reload));
        PolicyAdmin::new(store, enforcer)
    }

    /// Drop the policy tables so every store call fails.
    pub async fn break_schema(&self) {
        migration::Migrator::down(&self.connection, None)
            .await
            .expect("Failed to roll back migrations");
    }
}
