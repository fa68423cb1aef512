//! Request-context middleware.
//!
//! Extracts `X-Tenant-Id` (mandatory and non-empty for everything under
//! `/v1`), plus the optional `X-User-Id` and `X-User-Role` headers, into
//! a [`RequestContext`] request extension.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::responses::ApiError;
use crate::tenant::{Permission, Role};

/// Tenant header, mandatory on `/v1` routes.
pub const TENANT_HEADER: &str = "X-Tenant-Id";
/// Caller identity header, optional.
pub const USER_HEADER: &str = "X-User-Id";
/// Caller role header, optional; unknown roles grant nothing.
pub const ROLE_HEADER: &str = "X-User-Role";

/// Authenticated request context handed to every handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub role: Option<Role>,
}

impl RequestContext {
    /// Whether the caller may perform `permission`.
    ///
    /// Callers without a role header act as labelers; `admin` passes
    /// every check.
    pub fn allows(&self, permission: Permission) -> bool {
        self.role.unwrap_or(Role::Labeler).has_permission(permission)
    }

    /// Guard used by handlers: `forbidden` unless allowed.
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Build the [`RequestContext`] or reject with `tenant_required`.
pub async fn tenant_context_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers();

    let Some(tenant_id) = header_value(headers, TENANT_HEADER) else {
        return ApiError::tenant_required().into_response();
    };

    let context = RequestContext {
        tenant_id,
        user_id: header_value(headers, USER_HEADER),
        role: header_value(headers, ROLE_HEADER)
            .as_deref()
            .and_then(Role::parse),
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}
