//! Workspace creation and role-gated reads

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::{ApiJson, ApiQuery, ListQuery, Page, SortField, CREATED_AT, UPDATED_AT};
use crate::caller::Caller;
use crate::chat_db::{is_unique_violation, Workspace};
use crate::error::ServerError;
use crate::shared_state::AppState;

const WORKSPACE_SORT_FIELDS: [SortField; 4] = [CREATED_AT, ("slug", "slug"), ("name", "name"), UPDATED_AT];

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 64))]
    pub slug: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// POST /workspaces
pub async fn create_workspace(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), ServerError> {
    if !caller.is_admin() {
        return Err(ServerError::Forbidden("creating workspaces requires an admin role".into()));
    }
    req.validate()?;

    match state.database.workspaces.create(&req.slug, &req.name, &req.roles) {
        Ok(workspace) => {
            info!("Workspace '{}' created by {}", workspace.slug, caller.user_id);
            Ok((StatusCode::CREATED, Json(workspace)))
        }
        Err(e) if is_unique_violation(&e) => {
            Err(ServerError::BadRequest(format!("workspace slug '{}' already exists", req.slug)))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /workspaces
pub async fn list_workspaces(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<Workspace>>, ServerError> {
    let resolved = query.resolve(&WORKSPACE_SORT_FIELDS)?;
    let page = state.database.workspaces.list_visible(&caller.roles, resolved.request)?;
    Ok(Json(Page::new(resolved, page)))
}

/// GET /workspaces/:slug
pub async fn get_workspace(
    State(state): State<AppState>,
    caller: Caller,
    Path(slug): Path<String>,
) -> Result<Json<Workspace>, ServerError> {
    let workspace = state
        .database
        .workspaces
        .find_by_slug(&slug)?
        .ok_or_else(|| ServerError::NotFound(format!("workspace '{}' not found", slug)))?;
    if !caller.shares_role_with(&workspace.roles) {
        return Err(ServerError::Forbidden(format!("no access to workspace '{}'", slug)));
    }
    Ok(Json(workspace))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{call, request, test_state, ProviderScript};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_only_admins_create_and_slugs_are_unique() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let body = json!({"slug": "support", "name": "Support", "roles": ["agent"]});

        let (status, _) = call(&state, request("POST", "/workspaces", Some(("u1", &["agent"][..])), Some(body.clone()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) =
            call(&state, request("POST", "/workspaces", Some(("root", &["superadmin"][..])), Some(body.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["roles"], json!(["agent"]));

        let (status, _) = call(&state, request("POST", "/workspaces", Some(("root", &["admin"][..])), Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reads_are_role_gated() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        state.database.workspaces.create("support", "Support", &["agent".to_string()]).unwrap();
        state.database.workspaces.create("billing", "Billing", &["finance".to_string()]).unwrap();

        let agent = Some(("u1", &["agent"][..]));
        let (status, page) = call(&state, request("GET", "/workspaces", agent, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["numberOfResults"], 1);
        assert_eq!(page["list"][0]["slug"], "support");

        let (status, _) = call(&state, request("GET", "/workspaces/support", agent, None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&state, request("GET", "/workspaces/billing", agent, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&state, request("GET", "/workspaces/nowhere", agent, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
