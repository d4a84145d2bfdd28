use crate::routes::AppState;
use crate::AppError;
use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use payroll_commons::ChannelSyncReport;
use payroll_commons::OrganizationSyncReport;
use std::sync::Arc;

pub async fn sync_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
) -> Result<Json<ChannelSyncReport>, AppError> {
    let report = state.reconciler.sync_channel(channel_id).await?;

    Ok(Json(report))
}

pub async fn sync_organization(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Result<Json<OrganizationSyncReport>, AppError> {
    let report = state.reconciler.sync_organization(&wallet).await?;

    Ok(Json(report))
}
