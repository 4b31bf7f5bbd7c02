use crate::chat_db::schema::*;
use crate::chat_db::{decode_list, encode_list, format_timestamp, get_conn, now_utc, parse_timestamp, DbPool};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

const WORKSPACE_COLUMNS: &str = "id, slug, name, roles, created_at, updated_at";

/// Rows whose `roles` JSON array shares at least one entry with the JSON array bound to ?1
const ROLE_OVERLAP_FILTER: &str =
    "EXISTS (SELECT 1 FROM json_each(workspaces.roles) r WHERE r.value IN (SELECT value FROM json_each(?1)))";

pub struct WorkspaceStore {
    pool: DbPool,
}

impl WorkspaceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(&self, slug: &str, name: &str, roles: &[String]) -> anyhow::Result<Workspace> {
        let id = Uuid::new_v4().to_string();
        let now = now_utc();

        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT INTO workspaces (id, slug, name, roles, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![&id, slug, name, encode_list(roles)?, format_timestamp(&now)],
        )?;

        info!("Created workspace '{}'", slug);
        Ok(Workspace {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            roles: roles.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Workspace>> {
        let conn = get_conn(&self.pool)?;
        let workspace = conn
            .query_row(
                &format!("SELECT {} FROM workspaces WHERE slug = ?1", WORKSPACE_COLUMNS),
                [slug],
                Self::row_to_workspace,
            )
            .optional()?;
        Ok(workspace)
    }

    /// One page of the workspaces visible to a caller holding `roles`, plus the visible total
    pub fn list_visible(&self, roles: &[String], page: PageRequest) -> anyhow::Result<(Vec<Workspace>, u64)> {
        let roles_json = encode_list(roles)?;
        let conn = get_conn(&self.pool)?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM workspaces WHERE {}", ROLE_OVERLAP_FILTER),
            [&roles_json],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workspaces WHERE {} {} LIMIT ?2 OFFSET ?3",
            WORKSPACE_COLUMNS,
            ROLE_OVERLAP_FILTER,
            page.order_clause()
        ))?;
        let mut rows = stmt.query(params![&roles_json, i64::from(page.page_size), page.offset()])?;
        let mut workspaces = Vec::new();
        while let Some(row) = rows.next()? {
            workspaces.push(Self::row_to_workspace(row)?);
        }

        debug!("Listed {} of {} visible workspaces", workspaces.len(), total);
        Ok((workspaces, total as u64))
    }

    fn row_to_workspace(row: &Row) -> rusqlite::Result<Workspace> {
        Ok(Workspace {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            roles: decode_list(&row.get::<_, String>(3)?),
            created_at: parse_timestamp(&row.get::<_, String>(4)?),
            updated_at: parse_timestamp(&row.get::<_, String>(5)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::chat_db::{ChatDatabase, PageRequest, SortDirection};

    fn roles(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn first_page() -> PageRequest {
        PageRequest { page_size: 10, page_number: 1, sort_column: "slug", direction: SortDirection::Asc }
    }

    #[test]
    fn test_find_by_slug() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let created = db.workspaces.create("support", "Support", &roles(&["agent"])).unwrap();

        assert_eq!(db.workspaces.find_by_slug("support").unwrap(), Some(created));
        assert!(db.workspaces.find_by_slug("unknown").unwrap().is_none());
    }

    #[test]
    fn test_list_visible_filters_by_role_overlap() {
        let db = ChatDatabase::new_in_memory().unwrap();
        db.workspaces.create("billing", "Billing", &roles(&["finance", "admin"])).unwrap();
        db.workspaces.create("support", "Support", &roles(&["agent"])).unwrap();
        db.workspaces.create("internal", "Internal", &[]).unwrap();

        let (visible, total) = db.workspaces.list_visible(&roles(&["agent", "viewer"]), first_page()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(visible[0].slug, "support");

        let (visible, total) = db.workspaces.list_visible(&roles(&["admin", "agent"]), first_page()).unwrap();
        assert_eq!(total, 2);
        let slugs: Vec<_> = visible.iter().map(|w| w.slug.as_str()).collect();
        assert_eq!(slugs, vec!["billing", "support"]);

        let (visible, total) = db.workspaces.list_visible(&[], first_page()).unwrap();
        assert_eq!(total, 0);
        assert!(visible.is_empty());
    }
}
