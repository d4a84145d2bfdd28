use crate::gateway::GatewayError;
use crate::gateway::PreparedPayload;
use crate::gateway::SignedOutcome;
use crate::gateway::WalletApi;
use async_trait::async_trait;
use parking_lot::Mutex;
use payroll_commons::NetworkTag;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;
use xahau_client::transactions::UnsignedTransaction;

/// What the frontend reports back after driving a local signing ceremony
/// (manual seed or browser extension).
///
/// Either the transaction was already submitted by the signer (`tx_hash`),
/// or the signer hands over the signed blob and the engine submits it on
/// their behalf (`signed_blob`, resolved into a hash before completion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResultReport {
    pub tx_hash: Option<String>,
    pub signed_blob: Option<String>,
    #[serde(default)]
    pub rejected: bool,
    /// The network the signing device was connected to.
    pub network: NetworkTag,
}

struct LocalPayload {
    account: String,
    network: NetworkTag,
    waiter: Option<oneshot::Sender<Result<SignedOutcome, GatewayError>>>,
    outcome: Option<Result<SignedOutcome, GatewayError>>,
}

/// Rendezvous between an awaiting engine task and the HTTP callback that
/// delivers the signing result.
///
/// Manual-seed and browser-extension ceremonies run entirely on the
/// caller's side; this store only pairs the result report with whoever is
/// waiting on the payload reference.
#[derive(Default)]
pub struct LocalPayloadStore {
    payloads: Mutex<HashMap<Uuid, LocalPayload>>,
}

impl LocalPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes a pending payload with the result reported by the signing
    /// device. A report from the wrong network is refused and leaves the
    /// payload pending.
    pub fn complete(
        &self,
        payload_ref: Uuid,
        report: SignResultReport,
    ) -> Result<(), GatewayError> {
        let mut payloads = self.payloads.lock();
        let payload = payloads
            .get_mut(&payload_ref)
            .ok_or(GatewayError::UnknownPayload(payload_ref))?;

        if report.network != payload.network {
            return Err(GatewayError::WrongNetwork {
                expected: payload.network,
                actual: report.network,
            });
        }

        let outcome = if report.rejected {
            Err(GatewayError::Rejected)
        } else {
            match report.tx_hash {
                Some(tx_hash) => Ok(SignedOutcome {
                    tx_hash,
                    engine_result: None,
                }),
                None => Err(GatewayError::Provider(
                    "result report carried neither a tx hash nor a rejection".to_string(),
                )),
            }
        };

        if let Some(waiter) = payload.waiter.take() {
            let _ = waiter.send(outcome);
            payloads.remove(&payload_ref);
        } else {
            payload.outcome = Some(outcome);
        }

        Ok(())
    }
}

#[async_trait]
impl WalletApi for LocalPayloadStore {
    async fn prepare_sign(
        &self,
        _tx: &UnsignedTransaction,
        account: &str,
        network: NetworkTag,
    ) -> Result<PreparedPayload, GatewayError> {
        let payload_ref = Uuid::new_v4();
        self.payloads.lock().insert(
            payload_ref,
            LocalPayload {
                account: account.to_string(),
                network,
                waiter: None,
                outcome: None,
            },
        );

        Ok(PreparedPayload {
            payload_ref,
            follow_up: None,
        })
    }

    async fn await_result(&self, payload_ref: Uuid) -> Result<SignedOutcome, GatewayError> {
        let receiver = {
            let mut payloads = self.payloads.lock();
            let payload = payloads
                .get_mut(&payload_ref)
                .ok_or(GatewayError::UnknownPayload(payload_ref))?;

            match payload.outcome.take() {
                Some(outcome) => {
                    payloads.remove(&payload_ref);
                    return outcome;
                }
                None => {
                    let (sender, receiver) = oneshot::channel();
                    payload.waiter = Some(sender);
                    receiver
                }
            }
        };

        receiver.await.unwrap_or(Err(GatewayError::Cancelled))
    }

    async fn cancel(&self, payload_ref: Uuid) {
        let payload = self.payloads.lock().remove(&payload_ref);
        if let Some(payload) = payload {
            tracing::debug!(%payload_ref, account = %payload.account, "Cancelled signing payload");
            if let Some(waiter) = payload.waiter {
                let _ = waiter.send(Err(GatewayError::Cancelled));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xahau_client::transactions::PaymentChannelClaim;

    fn claim() -> UnsignedTransaction {
        UnsignedTransaction::PaymentChannelClaim(PaymentChannelClaim::close(
            "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx".to_string(),
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198".to_string(),
            Some(3_000_000),
            None,
        ))
    }

    const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

    #[tokio::test]
    async fn result_reported_before_the_wait_is_returned() {
        let store = LocalPayloadStore::new();
        let payload = store
            .prepare_sign(&claim(), "rWorker", NetworkTag::XahauTestnet)
            .await
            .unwrap();

        store
            .complete(
                payload.payload_ref,
                SignResultReport {
                    tx_hash: Some(TX_HASH.to_string()),
                    signed_blob: None,
                    rejected: false,
                    network: NetworkTag::XahauTestnet,
                },
            )
            .unwrap();

        let outcome = store.await_result(payload.payload_ref).await.unwrap();
        assert_eq!(outcome.tx_hash, TX_HASH);
    }

    #[tokio::test]
    async fn waiting_task_is_woken_by_the_report() {
        let store = std::sync::Arc::new(LocalPayloadStore::new());
        let payload = store
            .prepare_sign(&claim(), "rWorker", NetworkTag::XahauTestnet)
            .await
            .unwrap();

        let waiter = tokio::spawn({
            let store = store.clone();
            let payload_ref = payload.payload_ref;
            async move { store.await_result(payload_ref).await }
        });

        tokio::task::yield_now().await;
        store
            .complete(
                payload.payload_ref,
                SignResultReport {
                    tx_hash: Some(TX_HASH.to_string()),
                    signed_blob: None,
                    rejected: false,
                    network: NetworkTag::XahauTestnet,
                },
            )
            .unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome.tx_hash, TX_HASH);
    }

    #[tokio::test]
    async fn wrong_network_report_is_refused_and_payload_stays_pending() {
        let store = LocalPayloadStore::new();
        let payload = store
            .prepare_sign(&claim(), "rWorker", NetworkTag::XahauMainnet)
            .await
            .unwrap();

        let result = store.complete(
            payload.payload_ref,
            SignResultReport {
                tx_hash: Some(TX_HASH.to_string()),
                signed_blob: None,
                rejected: false,
                network: NetworkTag::XahauTestnet,
            },
        );
        assert!(matches!(result, Err(GatewayError::WrongNetwork { .. })));

        // A correct report afterwards still succeeds.
        store
            .complete(
                payload.payload_ref,
                SignResultReport {
                    tx_hash: Some(TX_HASH.to_string()),
                    signed_blob: None,
                    rejected: false,
                    network: NetworkTag::XahauMainnet,
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn rejection_is_a_typed_outcome() {
        let store = LocalPayloadStore::new();
        let payload = store
            .prepare_sign(&claim(), "rWorker", NetworkTag::XahauTestnet)
            .await
            .unwrap();

        store
            .complete(
                payload.payload_ref,
                SignResultReport {
                    tx_hash: None,
                    signed_blob: None,
                    rejected: true,
                    network: NetworkTag::XahauTestnet,
                },
            )
            .unwrap();

        let outcome = store.await_result(payload.payload_ref).await;
        assert!(matches!(outcome, Err(GatewayError::Rejected)));
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_waiter() {
        let store = std::sync::Arc::new(LocalPayloadStore::new());
        let payload = store
            .prepare_sign(&claim(), "rWorker", NetworkTag::XahauTestnet)
            .await
            .unwrap();

        let waiter = tokio::spawn({
            let store = store.clone();
            let payload_ref = payload.payload_ref;
            async move { store.await_result(payload_ref).await }
        });

        tokio::task::yield_now().await;
        store.cancel(payload.payload_ref).await;

        assert!(matches!(
            waiter.await.unwrap(),
            Err(GatewayError::Cancelled)
        ));
    }
}
