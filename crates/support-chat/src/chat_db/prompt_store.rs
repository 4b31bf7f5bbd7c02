use crate::chat_db::schema::*;
use crate::chat_db::{format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

const PROMPT_COLUMNS: &str = "app_id, prompt, created_at, updated_at";

pub struct PromptStore {
    pool: DbPool,
}

impl PromptStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the prompt for `app_id`, or replace its text in place
    pub fn upsert(&self, app_id: &str, prompt: &str) -> anyhow::Result<Prompt> {
        let now = format_timestamp(&now_utc());
        let conn = get_conn(&self.pool)?;
        let stored = conn.query_row(
            &format!(
                "INSERT INTO prompts (app_id, prompt, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(app_id) DO UPDATE SET prompt = excluded.prompt, updated_at = excluded.updated_at
                 RETURNING {}",
                PROMPT_COLUMNS
            ),
            params![app_id, prompt, &now],
            Self::row_to_prompt,
        )?;
        info!("Stored prompt for app '{}'", app_id);
        Ok(stored)
    }

    /// Replace the text of an existing prompt; `None` when `app_id` has none
    pub fn update(&self, app_id: &str, prompt: &str) -> anyhow::Result<Option<Prompt>> {
        let now = format_timestamp(&now_utc());
        let conn = get_conn(&self.pool)?;
        let updated = conn
            .query_row(
                &format!(
                    "UPDATE prompts SET prompt = ?2, updated_at = ?3 WHERE app_id = ?1 RETURNING {}",
                    PROMPT_COLUMNS
                ),
                params![app_id, prompt, &now],
                Self::row_to_prompt,
            )
            .optional()?;
        Ok(updated)
    }

    pub fn get(&self, app_id: &str) -> anyhow::Result<Option<Prompt>> {
        let conn = get_conn(&self.pool)?;
        let prompt = conn
            .query_row(
                &format!("SELECT {} FROM prompts WHERE app_id = ?1", PROMPT_COLUMNS),
                [app_id],
                Self::row_to_prompt,
            )
            .optional()?;
        Ok(prompt)
    }

    /// The oldest stored prompt of any app
    pub fn first(&self) -> anyhow::Result<Option<Prompt>> {
        let conn = get_conn(&self.pool)?;
        let prompt = conn
            .query_row(
                &format!("SELECT {} FROM prompts ORDER BY created_at ASC, rowid ASC LIMIT 1", PROMPT_COLUMNS),
                [],
                Self::row_to_prompt,
            )
            .optional()?;
        Ok(prompt)
    }

    fn row_to_prompt(row: &Row) -> rusqlite::Result<Prompt> {
        Ok(Prompt {
            app_id: row.get(0)?,
            prompt: row.get(1)?,
            created_at: parse_timestamp(&row.get::<_, String>(2)?),
            updated_at: parse_timestamp(&row.get::<_, String>(3)?),
        })
    }
}
