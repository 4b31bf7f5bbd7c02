use crate::chat_db::schema::*;
use crate::chat_db::{decode_list, encode_list, format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, Row};
use tracing::{debug, warn};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, user_id, workspace_slug, sender, kind, content, file_urls, suggest_ticket, created_at";

pub struct MessageStore {
    pool: DbPool,
}

impl MessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one message and bump the owning conversation's `updated_at`
    pub fn append(&self, new: NewMessage<'_>) -> anyhow::Result<StoredMessage> {
        let id = Uuid::new_v4().to_string();
        let now = now_utc();
        let now_str = format_timestamp(&now);

        let mut conn = get_conn(&self.pool)?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", MESSAGE_COLUMNS),
            params![
                &id,
                new.conversation_id,
                new.user_id,
                new.workspace_slug,
                new.sender.as_str(),
                new.kind.as_str(),
                new.content,
                encode_list(new.file_urls)?,
                new.suggest_ticket,
                &now_str,
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![&now_str, new.conversation_id],
        )?;
        tx.commit()?;

        debug!("Stored {} message {} in conversation {}", new.sender.as_str(), id, new.conversation_id);
        Ok(StoredMessage {
            id,
            conversation_id: new.conversation_id.to_string(),
            user_id: new.user_id.to_string(),
            workspace_slug: new.workspace_slug.to_string(),
            sender: new.sender,
            kind: new.kind,
            content: new.content.to_string(),
            file_urls: new.file_urls.to_vec(),
            suggest_ticket: new.suggest_ticket,
            created_at: now,
        })
    }

    /// Full history of a conversation, oldest first
    pub fn history(&self, conversation_id: &str) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = get_conn(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
            MESSAGE_COLUMNS
        ))?;
        let mut rows = stmt.query([conversation_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(Self::row_to_message(row)?);
        }
        Ok(messages)
    }

    pub fn count(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_message(row: &Row) -> anyhow::Result<StoredMessage> {
        let sender: String = row.get(4)?;
        let sender = Sender::parse(&sender)
            .ok_or_else(|| anyhow::anyhow!("Unknown sender '{}' in message store", sender))?;
        let kind: String = row.get(5)?;
        let kind = MessageKind::parse(&kind).unwrap_or_else(|| {
            warn!("Unknown message kind '{}', treating as text", kind);
            MessageKind::Text
        });

        Ok(StoredMessage {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            user_id: row.get(2)?,
            workspace_slug: row.get(3)?,
            sender,
            kind,
            content: row.get(6)?,
            file_urls: decode_list(&row.get::<_, String>(7)?),
            suggest_ticket: row.get(8)?,
            created_at: parse_timestamp(&row.get::<_, String>(9)?),
        })
    }
}
