use crate::chat_db::schema::*;
use crate::chat_db::{decode_list, encode_list, format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, roles, created_at, updated_at, password_hash";

pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a user. A duplicate email surfaces as a unique violation.
    pub fn create(&self, email: &str, password_hash: &str, roles: &[String]) -> anyhow::Result<User> {
        let id = Uuid::new_v4().to_string();
        let now = now_utc();
        let now_str = format_timestamp(&now);

        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT INTO users (id, email, password_hash, roles, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![&id, email, password_hash, encode_list(roles)?, &now_str],
        )?;

        info!("Registered user {}", id);
        Ok(User { id, email: email.to_string(), roles: roles.to_vec(), created_at: now, updated_at: now })
    }

    pub fn find_credentials_by_email(&self, email: &str) -> anyhow::Result<Option<UserCredentials>> {
        let conn = get_conn(&self.pool)?;
        let found = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                [email],
                |row| Ok((Self::row_to_user(row)?, row.get::<_, String>(5)?)),
            )
            .optional()?;
        Ok(found.map(|(user, password_hash)| UserCredentials { user, password_hash }))
    }

    pub fn get(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let conn = get_conn(&self.pool)?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [user_id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// One page of users plus the total count
    pub fn list(&self, page: PageRequest) -> anyhow::Result<(Vec<User>, u64)> {
        let conn = get_conn(&self.pool)?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users {} LIMIT ?1 OFFSET ?2",
            USER_COLUMNS,
            page.order_clause()
        ))?;
        let mut rows = stmt.query(params![i64::from(page.page_size), page.offset()])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(Self::row_to_user(row)?);
        }
        Ok((users, total as u64))
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            roles: decode_list(&row.get::<_, String>(2)?),
            created_at: parse_timestamp(&row.get::<_, String>(3)?),
            updated_at: parse_timestamp(&row.get::<_, String>(4)?),
        })
    }
}
