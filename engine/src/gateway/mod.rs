use async_trait::async_trait;
use parking_lot::Mutex;
use payroll_commons::NetworkTag;
use payroll_commons::WalletProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use xahau_client::transactions::UnsignedTransaction;

pub mod local;
pub mod xaman;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("the signing request was cancelled")]
    Cancelled,
    #[error("the signing request expired before the user acted")]
    Expired,
    #[error("the wallet rejected the signing request")]
    Rejected,
    #[error("payload is bound to {expected} but the device is on {actual}")]
    WrongNetwork {
        expected: NetworkTag,
        actual: NetworkTag,
    },
    #[error("no signing payload with reference {0}")]
    UnknownPayload(Uuid),
    #[error("wallet provider error: {0}")]
    Provider(String),
}

/// A signing payload handed to the wallet ceremony.
#[derive(Debug, Clone)]
pub struct PreparedPayload {
    pub payload_ref: Uuid,
    /// QR / deep-link the frontend follows up on, when the provider has one.
    pub follow_up: Option<String>,
}

/// Terminal outcome of a signing ceremony.
#[derive(Debug, Clone)]
pub struct SignedOutcome {
    pub tx_hash: String,
    /// Engine result reported by the wallet service if it also submitted
    /// the transaction.
    pub engine_result: Option<String>,
}

/// One concrete wallet ceremony (hosted QR service, local rendezvous, ...).
///
/// `await_result` blocks until a terminal outcome; the [`SigningGateway`]
/// bounds it with the configured deadline.
#[async_trait]
pub trait WalletApi: Send + Sync + 'static {
    async fn prepare_sign(
        &self,
        tx: &UnsignedTransaction,
        account: &str,
        network: NetworkTag,
    ) -> Result<PreparedPayload, GatewayError>;

    async fn await_result(&self, payload_ref: Uuid) -> Result<SignedOutcome, GatewayError>;

    async fn cancel(&self, payload_ref: Uuid);
}

/// Routes signing requests to the registered wallet providers and applies
/// the deadline to every wait.
pub struct SigningGateway {
    providers: HashMap<WalletProvider, Arc<dyn WalletApi>>,
    default_provider: WalletProvider,
    network: NetworkTag,
    deadline: Duration,
    // Which provider owns which outstanding payload.
    payload_owners: Mutex<HashMap<Uuid, WalletProvider>>,
}

impl SigningGateway {
    pub fn new(network: NetworkTag, deadline: Duration, default_provider: WalletProvider) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
            network,
            deadline,
            payload_owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, provider: WalletProvider, api: Arc<dyn WalletApi>) {
        self.providers.insert(provider, api);
    }

    pub fn network(&self) -> NetworkTag {
        self.network
    }

    fn api_for(&self, provider: WalletProvider) -> Result<&Arc<dyn WalletApi>, GatewayError> {
        self.providers.get(&provider).ok_or_else(|| {
            GatewayError::Provider(format!("wallet provider {provider} is not configured"))
        })
    }

    pub async fn prepare_sign(
        &self,
        provider: Option<WalletProvider>,
        tx: &UnsignedTransaction,
    ) -> Result<PreparedPayload, GatewayError> {
        let provider = provider.unwrap_or(self.default_provider);
        let api = self.api_for(provider)?;

        let payload = api
            .prepare_sign(tx, tx.signing_account(), self.network)
            .await?;

        tracing::debug!(
            payload_ref = %payload.payload_ref,
            %provider,
            account = tx.signing_account(),
            "Prepared signing payload"
        );

        self.payload_owners
            .lock()
            .insert(payload.payload_ref, provider);

        Ok(payload)
    }

    /// Waits for the ceremony to finish. On deadline the payload is
    /// cancelled with the provider so a late signature cannot surprise us.
    pub async fn await_result(&self, payload_ref: Uuid) -> Result<SignedOutcome, GatewayError> {
        let provider = self
            .payload_owners
            .lock()
            .get(&payload_ref)
            .copied()
            .ok_or(GatewayError::UnknownPayload(payload_ref))?;
        let api = self.api_for(provider)?;

        let outcome = match tokio::time::timeout(self.deadline, api.await_result(payload_ref)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(%payload_ref, "Signing ceremony timed out, cancelling payload");
                api.cancel(payload_ref).await;
                Err(GatewayError::Expired)
            }
        };

        self.payload_owners.lock().remove(&payload_ref);

        outcome
    }

    pub async fn cancel(&self, payload_ref: Uuid) {
        let provider = self.payload_owners.lock().remove(&payload_ref);
        if let Some(provider) = provider {
            if let Ok(api) = self.api_for(provider) {
                api.cancel(payload_ref).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xahau_client::transactions::PaymentChannelClaim;

    struct NeverSigns;

    #[async_trait]
    impl WalletApi for NeverSigns {
        async fn prepare_sign(
            &self,
            _tx: &UnsignedTransaction,
            _account: &str,
            _network: NetworkTag,
        ) -> Result<PreparedPayload, GatewayError> {
            Ok(PreparedPayload {
                payload_ref: Uuid::new_v4(),
                follow_up: None,
            })
        }

        async fn await_result(&self, _payload_ref: Uuid) -> Result<SignedOutcome, GatewayError> {
            futures::future::pending().await
        }

        async fn cancel(&self, _payload_ref: Uuid) {}
    }

    fn claim() -> UnsignedTransaction {
        UnsignedTransaction::PaymentChannelClaim(PaymentChannelClaim::close(
            "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx".to_string(),
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198".to_string(),
            None,
            None,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn wait_is_bounded_by_the_deadline() {
        let mut gateway = SigningGateway::new(
            NetworkTag::XahauTestnet,
            Duration::from_secs(300),
            WalletProvider::ManualSeed,
        );
        gateway.register(WalletProvider::ManualSeed, Arc::new(NeverSigns));

        let payload = gateway.prepare_sign(None, &claim()).await.unwrap();
        let result = gateway.await_result(payload.payload_ref).await;

        assert!(matches!(result, Err(GatewayError::Expired)));
    }

    #[tokio::test]
    async fn unknown_payload_refs_are_rejected() {
        let gateway = SigningGateway::new(
            NetworkTag::XahauTestnet,
            Duration::from_secs(300),
            WalletProvider::ManualSeed,
        );

        let result = gateway.await_result(Uuid::new_v4()).await;

        assert!(matches!(result, Err(GatewayError::UnknownPayload(_))));
    }

    #[tokio::test]
    async fn unconfigured_providers_are_a_typed_failure() {
        let gateway = SigningGateway::new(
            NetworkTag::XahauTestnet,
            Duration::from_secs(300),
            WalletProvider::MobileQr,
        );

        let result = gateway.prepare_sign(None, &claim()).await;

        assert!(matches!(result, Err(GatewayError::Provider(_))));
    }
}
