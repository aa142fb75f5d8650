use axum::extract::{Query, State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{AuditLogQuery, AuditLogResponse};
use crate::pagination::Paginated;

/// Browse the audit trail, newest first. Lives in the separate audit database,
/// so this endpoint never touches the main pool.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLogResponse>>> {
    let conn = state.audit.get()?;
    let limit = query.limit();
    let offset = query.offset();
    let (logs, total) = queries::query_audit_logs(&conn, &query)?;
    let page = Paginated::new(logs, total, limit, offset).map(AuditLogResponse::from);
    Ok(Json(page))
}
