use crate::error::LifecycleError;
use crate::gateway::local::SignResultReport;
use crate::routes::AppState;
use crate::AppError;
use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

/// Callback completing a locally driven signing ceremony. The frontend (or
/// browser extension) reports the signed transaction hash or a rejection;
/// a manual-seed signer may hand over the signed blob instead, which the
/// engine submits to the ledger before completing the payload.
pub async fn post_result(
    State(state): State<Arc<AppState>>,
    Path(payload_ref): Path<Uuid>,
    Json(report): Json<SignResultReport>,
) -> Result<(), AppError> {
    let mut report = report;
    if report.tx_hash.is_none() && !report.rejected {
        if let Some(signed_blob) = report.signed_blob.take() {
            let outcome = state
                .ledger
                .submit(&signed_blob)
                .await
                .map_err(|e| AppError::from(LifecycleError::Ledger(e)))?;

            tracing::debug!(
                %payload_ref,
                tx_hash = %outcome.tx_json.hash,
                engine_result = %outcome.engine_result,
                "Submitted locally signed transaction"
            );

            report.tx_hash = Some(outcome.tx_json.hash);
        }
    }

    state.local_wallet.complete(payload_ref, report)?;

    Ok(())
}
