use crate::chat_db::schema::*;
use crate::chat_db::{format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

const SETTINGS_COLUMNS: &str = "user_id, theme, notify_email, notify_push, language, created_at, updated_at";

pub struct SettingsStore {
    pool: DbPool,
}

impl SettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self, user_id: &str) -> anyhow::Result<Option<Settings>> {
        let conn = get_conn(&self.pool)?;
        let settings = conn
            .query_row(
                &format!("SELECT {} FROM settings WHERE user_id = ?1", SETTINGS_COLUMNS),
                [user_id],
                Self::row_to_settings,
            )
            .optional()?;
        Ok(settings)
    }

    /// Apply `patch` over the stored settings, or over the defaults when the user has none
    pub fn upsert(&self, user_id: &str, patch: SettingsPatch) -> anyhow::Result<Settings> {
        let now = now_utc();
        let mut conn = get_conn(&self.pool)?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {} FROM settings WHERE user_id = ?1", SETTINGS_COLUMNS),
                [user_id],
                Self::row_to_settings,
            )
            .optional()?;
        let base = existing.unwrap_or_else(|| Settings {
            user_id: user_id.to_string(),
            theme: Theme::default(),
            notifications: Notifications::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: now,
            updated_at: now,
        });

        let merged = Settings {
            theme: patch.theme.unwrap_or(base.theme),
            notifications: patch.notifications.unwrap_or(base.notifications),
            language: patch.language.unwrap_or(base.language),
            updated_at: now,
            ..base
        };

        tx.execute(
            "INSERT INTO settings (user_id, theme, notify_email, notify_push, language, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                theme = excluded.theme,
                notify_email = excluded.notify_email,
                notify_push = excluded.notify_push,
                language = excluded.language,
                updated_at = excluded.updated_at",
            params![
                &merged.user_id,
                merged.theme.as_str(),
                merged.notifications.email,
                merged.notifications.push,
                &merged.language,
                format_timestamp(&merged.created_at),
                format_timestamp(&merged.updated_at),
            ],
        )?;
        tx.commit()?;

        debug!("Saved settings for user {}", user_id);
        Ok(merged)
    }

    fn row_to_settings(row: &Row) -> rusqlite::Result<Settings> {
        let theme: String = row.get(1)?;
        Ok(Settings {
            user_id: row.get(0)?,
            theme: Theme::parse(&theme).unwrap_or_else(|| {
                warn!("Unknown theme '{}' in settings, using default", theme);
                Theme::default()
            }),
            notifications: Notifications { email: row.get(2)?, push: row.get(3)? },
            language: row.get(4)?,
            created_at: parse_timestamp(&row.get::<_, String>(5)?),
            updated_at: parse_timestamp(&row.get::<_, String>(6)?),
        })
    }
}
