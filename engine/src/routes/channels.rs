use crate::db;
use crate::error::LifecycleError;
use crate::lifecycle::CloseOutcome;
use crate::routes::AppState;
use crate::AppError;
use anyhow::Context;
use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use payroll_commons::Channel;
use payroll_commons::CloseChannelParams;
use payroll_commons::CloseChannelResponse;
use payroll_commons::CloseConfirmationResponse;
use payroll_commons::ConfirmCloseParams;
use payroll_commons::ConfirmCreateParams;
use payroll_commons::ConfirmFundParams;
use payroll_commons::CreateChannelParams;
use payroll_commons::CreateChannelResponse;
use payroll_commons::FundChannelParams;
use payroll_commons::PreparedSigning;
use std::sync::Arc;
use tokio::task::spawn_blocking;

pub async fn post_channel(
    State(state): State<Arc<AppState>>,
    Json(params): Json<CreateChannelParams>,
) -> Result<Json<CreateChannelResponse>, AppError> {
    let (channel, signing) = state.lifecycle.create_channel(params).await?;

    Ok(Json(CreateChannelResponse { channel, signing }))
}

pub async fn confirm_create(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<ConfirmCreateParams>,
) -> Result<Json<Channel>, AppError> {
    let channel = state.lifecycle.confirm_create(channel_id, params).await?;

    Ok(Json(channel))
}

pub async fn close_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<CloseChannelParams>,
) -> Result<Json<CloseChannelResponse>, AppError> {
    let outcome = state.lifecycle.close_channel(channel_id, params).await?;

    let response = match outcome {
        CloseOutcome::Prepared {
            prepared,
            expected_kind,
        } => CloseChannelResponse::Prepared {
            signing: prepared,
            expected_kind: expected_kind.to_string(),
        },
        CloseOutcome::AlreadyClosing {
            closure_tx_hash,
            expiration_ripple_time,
        } => CloseChannelResponse::AlreadyClosing {
            closure_tx_hash,
            expiration_ripple_time,
        },
        CloseOutcome::AlreadyClosed { closure_tx_hash } => {
            CloseChannelResponse::AlreadyClosed { closure_tx_hash }
        }
    };

    Ok(Json(response))
}

pub async fn confirm_close(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<ConfirmCloseParams>,
) -> Result<Json<CloseConfirmationResponse>, AppError> {
    let confirmation = state.lifecycle.confirm_close(channel_id, params).await?;

    Ok(Json(CloseConfirmationResponse {
        status: confirmation.status,
        kind: confirmation.kind.to_string(),
        closure_tx_hash: confirmation.closure_tx_hash,
        expiration_ripple_time: confirmation.expiration_ripple_time,
    }))
}

pub async fn closure_request(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
) -> Result<(), AppError> {
    state.lifecycle.request_closure(channel_id).await?;

    Ok(())
}

pub async fn fund_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<FundChannelParams>,
) -> Result<Json<PreparedSigning>, AppError> {
    let signing = state.lifecycle.fund_channel(channel_id, params).await?;

    Ok(Json(signing))
}

pub async fn confirm_fund(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
    Json(params): Json<ConfirmFundParams>,
) -> Result<Json<Channel>, AppError> {
    let channel = state.lifecycle.confirm_fund(channel_id, params).await?;

    Ok(Json(channel))
}

pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
) -> Result<Json<Channel>, AppError> {
    let pool = state.pool.clone();
    let channel = spawn_blocking(move || {
        let mut conn = pool.get()?;
        let channel = db::channels::get(&mut conn, channel_id)?
            .ok_or(LifecycleError::NoSuchChannel(channel_id))?;
        let organization = db::organizations::get(&mut conn, channel.organization_id)?
            .context("Channel references a missing organization")?;
        let employee = db::employees::get(&mut conn, channel.employee_id)?
            .context("Channel references a missing employee")?;
        Ok::<_, LifecycleError>(
            channel.to_common(&organization.wallet_address, &employee.wallet_address),
        )
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to load channel: {e:#}")))??;

    Ok(Json(channel))
}

pub async fn get_organization_channels(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<Channel>>, AppError> {
    let pool = state.pool.clone();
    let channels = spawn_blocking(move || {
        let mut conn = pool.get()?;
        let organization = db::organizations::get_by_wallet(&mut conn, &wallet)?.ok_or_else(|| {
            LifecycleError::InvalidParameters(format!("no organization with wallet {wallet}"))
        })?;

        let mut channels = Vec::new();
        for channel in db::channels::list_by_organization(&mut conn, organization.id)? {
            let employee = db::employees::get(&mut conn, channel.employee_id)?
                .context("Channel references a missing employee")?;
            channels.push(
                channel.to_common(&organization.wallet_address, &employee.wallet_address),
            );
        }
        Ok::<_, LifecycleError>(channels)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to load channels: {e:#}")))??;

    Ok(Json(channels))
}
