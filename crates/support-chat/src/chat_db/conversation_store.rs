use crate::chat_db::schema::*;
use crate::chat_db::{decode_list, encode_list, format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, name, roles, workspace_slug, created_by, created_at, updated_at";

pub struct ConversationStore {
    pool: DbPool,
}

impl ConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a conversation. The workspace slug must already exist.
    pub fn create(&self, new: NewConversation<'_>) -> anyhow::Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = now_utc();

        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT INTO conversations (id, name, roles, workspace_slug, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![&id, new.name, encode_list(new.roles)?, new.workspace_slug, new.created_by, format_timestamp(&now)],
        )?;

        info!("Created conversation {} in workspace '{}'", id, new.workspace_slug);
        Ok(Conversation {
            id,
            name: new.name.to_string(),
            roles: new.roles.to_vec(),
            workspace_slug: new.workspace_slug.to_string(),
            created_by: new.created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
        let conn = get_conn(&self.pool)?;
        let conversation = conn
            .query_row(
                &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
                [conversation_id],
                Self::row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    /// One page of the conversations created by `user_id`, plus that user's total
    pub fn list_for_user(&self, user_id: &str, page: PageRequest) -> anyhow::Result<(Vec<Conversation>, u64)> {
        let conn = get_conn(&self.pool)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE created_by = ?1",
            [user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE created_by = ?1 {} LIMIT ?2 OFFSET ?3",
            CONVERSATION_COLUMNS,
            page.order_clause()
        ))?;
        let mut rows = stmt.query(params![user_id, i64::from(page.page_size), page.offset()])?;
        let mut conversations = Vec::new();
        while let Some(row) = rows.next()? {
            conversations.push(Self::row_to_conversation(row)?);
        }

        debug!("Listed {} of {} conversations for user {}", conversations.len(), total, user_id);
        Ok((conversations, total as u64))
    }

    /// The caller's conversations in one workspace, newest first
    pub fn list_for_user_in_workspace(&self, user_id: &str, workspace_slug: &str) -> anyhow::Result<Vec<Conversation>> {
        let conn = get_conn(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE created_by = ?1 AND workspace_slug = ?2
             ORDER BY created_at DESC, rowid DESC",
            CONVERSATION_COLUMNS
        ))?;
        let mut rows = stmt.query(params![user_id, workspace_slug])?;
        let mut conversations = Vec::new();
        while let Some(row) = rows.next()? {
            conversations.push(Self::row_to_conversation(row)?);
        }
        Ok(conversations)
    }

    fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            name: row.get(1)?,
            roles: decode_list(&row.get::<_, String>(2)?),
            workspace_slug: row.get(3)?,
            created_by: row.get(4)?,
            created_at: parse_timestamp(&row.get::<_, String>(5)?),
            updated_at: parse_timestamp(&row.get::<_, String>(6)?),
        })
    }
}
