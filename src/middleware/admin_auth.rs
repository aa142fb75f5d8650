use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::models::AdminUser;
use crate::util::extract_bearer_token;

/// Authenticated admin identity, inserted into request extensions by the
/// auth middleware and read by handlers for audit attribution.
#[derive(Clone)]
pub struct AdminContext {
    pub admin: AdminUser,
    /// Id of the API key row used (not the key itself)
    pub key_id: String,
    /// Visible key prefix for audit entries (e.g., "kks_a1b2c3d4")
    pub key_prefix: String,
}

/// Authenticate an admin from the bearer API key.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AdminContext, StatusCode> {
    let token = extract_bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let (admin, key) = queries::get_admin_by_api_key(&conn, token)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(AdminContext {
        admin,
        key_id: key.id,
        key_prefix: key.key_prefix,
    })
}

/// Any active admin, regardless of role.
pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ctx = authenticate(&state, request.headers())?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// MANAGER or ADMIN role required (mutating routes).
pub async fn require_manager_role(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ctx = authenticate(&state, request.headers())?;

    if !ctx.admin.role.can_manage() {
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// ADMIN role required (admin-user and API-key management).
pub async fn require_admin_role(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ctx = authenticate(&state, request.headers())?;

    if !ctx.admin.role.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Convenience for handler-side checks where a route shared by several roles
/// needs a finer distinction (e.g., admins may read any admin user, managers
/// only themselves).
pub fn same_admin_or_admin_role(ctx: &AdminContext, target_admin: &AdminUser) -> bool {
    ctx.admin.role.is_admin() || ctx.admin.id == target_admin.id
}
