use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, CreateKpi, Kpi};
use crate::util::AuditLogBuilder;

/// Record a one-off metric value, e.g. figures imported from the accounting
/// system.
pub async fn create_kpi(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateKpi>,
) -> Result<Json<Kpi>> {
    input.validate()?;
    let conn = state.db.get()?;
    let kpi = queries::insert_kpi(
        &conn,
        input.metric.trim(),
        input.value,
        input.note.as_deref(),
        queries::now(),
    )?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateKpi)
        .resource("kpi", &kpi.id)
        .resource_name(&kpi.metric)
        .details(&json!({ "value": kpi.value }))
        .save()?;

    Ok(Json(kpi))
}

#[derive(Debug, Deserialize)]
pub struct KpiQuery {
    pub metric: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_kpis(
    State(state): State<AppState>,
    Query(query): Query<KpiQuery>,
) -> Result<Json<Vec<Kpi>>> {
    let conn = state.db.get()?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    Ok(Json(queries::list_kpis(
        &conn,
        query.metric.as_deref(),
        limit,
    )?))
}

/// The newest snapshot of each metric, the dashboard's landing view.
pub async fn latest_kpis(State(state): State<AppState>) -> Result<Json<Vec<Kpi>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::latest_kpis(&conn)?))
}

pub async fn recalculate_kpis(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
) -> Result<Json<Vec<Kpi>>> {
    let conn = state.db.get()?;
    let snapshots = queries::recalculate_kpis(&conn, queries::now())?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::RecalculateKpis)
        .resource("kpi", "all")
        .details(&json!({ "metrics": snapshots.iter().map(|k| &k.metric).collect::<Vec<_>>() }))
        .save()?;

    Ok(Json(snapshots))
}
