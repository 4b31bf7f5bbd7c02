//! Database migration system

use rusqlite::{Connection, Result};
use tracing::{error, info};

use crate::chat_db::schema;

/// Manages database schema migrations
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Bring the database up to the latest schema version
    pub fn initialize_database(&mut self) -> Result<()> {
        info!("Initializing chat database schema...");

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current_version = self.current_version()?;
        info!("Current database schema version: {}", current_version);

        self.apply_migrations(current_version)
    }

    pub fn current_version(&self) -> Result<i32> {
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }

    fn apply_migrations(&mut self, current_version: i32) -> Result<()> {
        for (version, migration_sql) in get_migrations() {
            if version <= current_version {
                continue;
            }
            info!("Applying migration {}...", version);

            let tx = self.conn.transaction()?;
            if let Err(e) = tx.execute_batch(migration_sql) {
                error!("Failed to apply migration {}: {}", version, e);
                return Err(e);
            }
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            tx.commit()?;

            info!("Migration {} applied successfully", version);
        }
        Ok(())
    }
}

fn get_migrations() -> Vec<(i32, &'static str)> {
    vec![(1, schema::SCHEMA_SQL)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut migrator = MigrationManager::new(&mut conn);
        migrator.initialize_database().unwrap();

        let latest = get_migrations().last().map(|(v, _)| *v).unwrap();
        assert_eq!(migrator.current_version().unwrap(), latest);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, get_migrations().len() as i64);
    }
}
