use crate::db;
use crate::error::LifecycleError;
use crate::routes::AppState;
use crate::AppError;
use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use payroll_commons::Notification;
use std::sync::Arc;
use tokio::task::spawn_blocking;

pub async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Path(party): Path<String>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let pool = state.pool.clone();
    let notifications = spawn_blocking(move || {
        let mut conn = pool.get()?;
        let notifications = db::notifications::list_for_party(&mut conn, &party)?
            .iter()
            .map(|notification| notification.to_common())
            .collect::<Vec<_>>();
        Ok::<_, LifecycleError>(notifications)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to load notifications: {e:#}")))??;

    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<i32>,
) -> Result<(), AppError> {
    let pool = state.pool.clone();
    spawn_blocking(move || {
        let mut conn = pool.get()?;
        db::notifications::mark_read(&mut conn, notification_id)?;
        Ok::<_, LifecycleError>(())
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to update notification: {e:#}")))??;

    Ok(())
}
