//! Chat database module - SQLite-backed storage for users, workspaces,
//! conversations, messages, prompts and settings
pub mod schema;
pub mod migration;
pub mod user_store;
pub mod workspace_store;
pub mod conversation_store;
pub mod message_store;
pub mod prompt_store;
pub mod settings_store;

pub use schema::*;
pub use migration::MigrationManager;
pub use user_store::UserStore;
pub use workspace_store::WorkspaceStore;
pub use conversation_store::ConversationStore;
pub use message_store::MessageStore;
pub use prompt_store::PromptStore;
pub use settings_store::SettingsStore;

use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::ErrorCode;
use tracing::{info, warn};

pub(crate) type DbPool = Arc<Pool<SqliteConnectionManager>>;
pub(crate) type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Every store shares one connection pool
pub struct ChatDatabase {
    pub users: UserStore,
    pub workspaces: WorkspaceStore,
    pub conversations: ConversationStore,
    pub messages: MessageStore,
    pub prompts: PromptStore,
    pub settings: SettingsStore,
}

impl ChatDatabase {
    /// Open (or create) the database file and run pending migrations
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening chat database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        info!("Chat database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Single-connection in-memory database. Each SQLite memory connection is
    /// its own database, so the pool must never open a second one.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            users: UserStore::new(Arc::clone(&pool)),
            workspaces: WorkspaceStore::new(Arc::clone(&pool)),
            conversations: ConversationStore::new(Arc::clone(&pool)),
            messages: MessageStore::new(Arc::clone(&pool)),
            prompts: PromptStore::new(Arc::clone(&pool)),
            settings: SettingsStore::new(pool),
        }
    }
}

pub(crate) fn get_conn(pool: &DbPool) -> anyhow::Result<PooledConn> {
    pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
}

/// Current time at the precision timestamps are stored with
pub(crate) fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return DateTime::from_naive_utc_and_offset(dt, Utc);
    }
    warn!("Failed to parse timestamp '{}', using now", value);
    Utc::now()
}

pub(crate) fn encode_list(values: &[String]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(values)?)
}

pub(crate) fn decode_list(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!("Malformed list column '{}': {}", json, e);
        Vec::new()
    })
}

/// True when the error chain bottoms out in a UNIQUE/PRIMARY KEY violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");

        {
            let db = ChatDatabase::new(&path).unwrap();
            db.workspaces.create("support", "Support", &["agent".to_string()]).unwrap();
        }

        let db = ChatDatabase::new(&path).unwrap();
        let workspace = db.workspaces.find_by_slug("support").unwrap().unwrap();
        assert_eq!(workspace.roles, vec!["agent".to_string()]);
    }

    #[test]
    fn test_timestamps_round_trip_and_sort_lexically() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);
        let (a, b) = (format_timestamp(&earlier), format_timestamp(&later));

        assert!(a < b);
        assert_eq!(parse_timestamp(&a).timestamp_micros(), earlier.timestamp_micros());
    }

    #[test]
    fn test_duplicate_slug_is_unique_violation() {
        let db = ChatDatabase::new_in_memory().unwrap();
        db.workspaces.create("billing", "Billing", &[]).unwrap();

        let err = db.workspaces.create("billing", "Billing again", &[]).unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
