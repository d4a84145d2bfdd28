use crate::gateway::local::LocalPayloadStore;
use crate::lifecycle::Lifecycle;
use crate::reconciler::Reconciler;
use crate::tracker::Tracker;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;
use std::sync::Arc;
use xahau_client::LedgerApi;

pub mod channels;
pub mod notifications;
pub mod payloads;
pub mod sessions;
pub mod sync;

pub struct AppState {
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub lifecycle: Arc<Lifecycle>,
    pub tracker: Arc<Tracker>,
    pub reconciler: Arc<Reconciler>,
    pub ledger: Arc<dyn LedgerApi>,
    pub local_wallet: Arc<LocalPayloadStore>,
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/channels", post(channels::post_channel))
        .route("/channels/:channel_id", get(channels::get_channel))
        .route(
            "/channels/:channel_id/confirm-create",
            post(channels::confirm_create),
        )
        .route("/channels/:channel_id/close", post(channels::close_channel))
        .route(
            "/channels/:channel_id/confirm-close",
            post(channels::confirm_close),
        )
        .route(
            "/channels/:channel_id/closure-request",
            post(channels::closure_request),
        )
        .route("/channels/:channel_id/fund", post(channels::fund_channel))
        .route(
            "/channels/:channel_id/confirm-fund",
            post(channels::confirm_fund),
        )
        .route("/channels/:channel_id/sync", post(sync::sync_channel))
        .route(
            "/channels/:channel_id/sessions",
            get(sessions::get_channel_sessions),
        )
        .route(
            "/channels/:channel_id/sessions/clock-in",
            post(sessions::clock_in),
        )
        .route("/sessions/:session_id/clock-out", post(sessions::clock_out))
        .route(
            "/organizations/:wallet/channels",
            get(channels::get_organization_channels),
        )
        .route(
            "/organizations/:wallet/sync-all",
            post(sync::sync_organization),
        )
        .route(
            "/notifications/:party",
            get(notifications::get_notifications),
        )
        .route(
            "/notifications/:notification_id/read",
            post(notifications::mark_read),
        )
        .route("/payloads/:payload_ref/result", post(payloads::post_result))
        .with_state(app_state)
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
