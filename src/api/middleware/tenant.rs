//! Tenant identity extractor

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::types::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

const ANONYMOUS_USER: &str = "anonymous";
const MAX_USER_ID_LENGTH: usize = 256;

/// Caller identity taken from trusted gateway headers
///
/// `X-Tenant-Id` is required; `X-User-Id` falls back to `anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header(parts, TENANT_HEADER)
            .ok_or_else(|| ApiError::bad_request("Missing X-Tenant-Id header").with_param("X-Tenant-Id"))?;

        let user_id = header(parts, USER_HEADER).unwrap_or_else(|| ANONYMOUS_USER.to_string());
        if user_id.len() > MAX_USER_ID_LENGTH {
            return Err(ApiError::bad_request("X-User-Id header is too long").with_param("X-User-Id"));
        }

        Ok(Self { tenant_id, user_id })
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
