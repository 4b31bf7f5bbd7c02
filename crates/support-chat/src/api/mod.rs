//! HTTP handlers, one module per resource

pub mod completion_api;
pub mod conversation_api;
pub mod message_api;
pub mod prompt_api;
pub mod settings_api;
pub mod user_api;
pub mod workspace_api;

use axum::extract::{FromRequest, FromRequestParts};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::chat_db::{PageRequest, SortDirection};
use crate::error::ServerError;

/// `Json` body extractor whose rejections are `{"error": ...}` 400s
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejections are `{"error": ...}` 400s
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct ApiQuery<T>(pub T);

fn default_page_size() -> u32 { 10 }
fn default_page_number() -> u32 { 1 }

/// Query string shared by every paginated listing
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
    #[serde(default = "default_page_number")]
    #[validate(range(min = 1))]
    pub page_number: u32,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

/// A sortable field: its name in the API and its column in the store
pub type SortField = (&'static str, &'static str);

pub const CREATED_AT: SortField = ("createdAt", "created_at");
pub const UPDATED_AT: SortField = ("updatedAt", "updated_at");

impl ListQuery {
    /// Resolve the query against the listing's sortable fields; the first field is the default
    pub fn resolve(&self, fields: &[SortField]) -> Result<ResolvedList, ServerError> {
        self.validate()?;
        let default = fields.first().ok_or_else(|| ServerError::Internal("listing without sort fields".into()))?;

        let (sort_by, column) = match self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            None => *default,
            Some(requested) => *fields
                .iter()
                .find(|(name, _)| *name == requested)
                .ok_or_else(|| ServerError::BadRequest(format!("invalid sort field: {}", requested)))?,
        };
        let direction = match self.sort_direction.as_deref().filter(|s| !s.is_empty()) {
            None | Some("desc") => SortDirection::Desc,
            Some("asc") => SortDirection::Asc,
            Some(other) => return Err(ServerError::BadRequest(format!("invalid sort direction: {}", other))),
        };

        Ok(ResolvedList {
            sort_by,
            request: PageRequest {
                page_size: self.page_size,
                page_number: self.page_number,
                sort_column: column,
                direction,
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedList {
    pub sort_by: &'static str,
    pub request: PageRequest,
}

/// One page of results echoing the resolved query
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page_size: u32,
    pub page_number: u32,
    pub sort_by: &'static str,
    pub sort_direction: SortDirection,
    pub number_of_results: u64,
    pub list: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(resolved: ResolvedList, (list, number_of_results): (Vec<T>, u64)) -> Self {
        Self {
            page_size: resolved.request.page_size,
            page_number: resolved.request.page_number,
            sort_by: resolved.sort_by,
            sort_direction: resolved.request.direction,
            number_of_results,
            list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(sort_by: Option<&str>, sort_direction: Option<&str>) -> ListQuery {
        ListQuery {
            page_size: 10,
            page_number: 1,
            sort_by: sort_by.map(str::to_string),
            sort_direction: sort_direction.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults_to_first_field_descending() {
        let resolved = query(None, None).resolve(&[CREATED_AT, ("email", "email")]).unwrap();
        assert_eq!(resolved.sort_by, "createdAt");
        assert_eq!(resolved.request.sort_column, "created_at");
        assert_eq!(resolved.request.direction, SortDirection::Desc);
    }

    #[test]
    fn test_rejects_unknown_sort_field_and_direction() {
        assert!(matches!(query(Some("password"), None).resolve(&[CREATED_AT]), Err(ServerError::BadRequest(_))));
        assert!(matches!(query(None, Some("sideways")).resolve(&[CREATED_AT]), Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut q = query(None, Some("asc"));
        q.page_size = 0;
        assert!(matches!(q.resolve(&[CREATED_AT]), Err(ServerError::BadRequest(_))));
    }
}
