use crate::db;
use crate::error::LifecycleError;
use crate::routes::AppState;
use crate::AppError;
use anyhow::Context;
use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use payroll_commons::ClockInParams;
use payroll_commons::ClockOutOutcome;
use payroll_commons::WorkSession;
use std::sync::Arc;
use tokio::task::spawn_blocking;

pub async fn clock_in(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<ClockInParams>,
) -> Result<Json<WorkSession>, AppError> {
    let session = state
        .tracker
        .clock_in(channel_id, params.employee_wallet)
        .await?;

    Ok(Json(session))
}

pub async fn clock_out(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
) -> Result<Json<ClockOutOutcome>, AppError> {
    let outcome = state.tracker.clock_out(session_id).await?;

    Ok(Json(outcome))
}

pub async fn get_channel_sessions(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
) -> Result<Json<Vec<WorkSession>>, AppError> {
    let pool = state.pool.clone();
    let sessions = spawn_blocking(move || {
        let mut conn = pool.get()?;
        let channel = db::channels::get(&mut conn, channel_id)?
            .ok_or(LifecycleError::NoSuchChannel(channel_id))?;
        let employee = db::employees::get(&mut conn, channel.employee_id)?
            .context("Channel references a missing employee")?;

        let sessions = db::work_sessions::list_for_channel(&mut conn, channel_id)?
            .iter()
            .map(|session| session.to_common(&employee.wallet_address))
            .collect::<Vec<_>>();
        Ok::<_, LifecycleError>(sessions)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to load sessions: {e:#}")))??;

    Ok(Json(sessions))
}
