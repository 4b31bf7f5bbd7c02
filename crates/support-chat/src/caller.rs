//! Identity of the authenticated caller, forwarded by the upstream auth layer as headers
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

const ADMIN_ROLES: [&str; 2] = ["admin", "superadmin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServerError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ServerError::Unauthorized("missing caller identity".into()))?
            .to_string();
        let roles = header(USER_ROLES_HEADER)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { user_id, email: header(USER_EMAIL_HEADER).map(str::to_string), roles })
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| ADMIN_ROLES.contains(&r.as_str()))
    }

    pub fn shares_role_with(&self, roles: &[String]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_missing_user_id_is_unauthorized() {
        let err = Caller::from_headers(&headers(&[(USER_ROLES_HEADER, "admin")])).unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
    }

    #[test]
    fn test_roles_are_split_and_trimmed() {
        let caller = Caller::from_headers(&headers(&[
            (USER_ID_HEADER, "u1"),
            (USER_EMAIL_HEADER, "ana@example.com"),
            (USER_ROLES_HEADER, " agent , superadmin,,"),
        ]))
        .unwrap();

        assert_eq!(caller.roles, vec!["agent".to_string(), "superadmin".to_string()]);
        assert_eq!(caller.email.as_deref(), Some("ana@example.com"));
        assert!(caller.is_admin());
        assert!(caller.shares_role_with(&["agent".to_string()]));
        assert!(!caller.shares_role_with(&["finance".to_string()]));
    }

    #[test]
    fn test_no_roles_shares_nothing() {
        let caller = Caller::from_headers(&headers(&[(USER_ID_HEADER, "u1")])).unwrap();
        assert!(!caller.is_admin());
        assert!(!caller.shares_role_with(&[]));
    }
}
