use crate::gateway::GatewayError;
use crate::gateway::PreparedPayload;
use crate::gateway::SignedOutcome;
use crate::gateway::WalletApi;
use async_trait::async_trait;
use payroll_commons::NetworkTag;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use xahau_client::transactions::UnsignedTransaction;

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// QR / deep-link signing through a Xaman-compatible payload service.
///
/// `prepare_sign` registers a payload and returns the deep link the
/// frontend renders as a QR code; `await_result` polls the payload until
/// the user signed, rejected, or the service expired it. The payload is
/// pinned to the engine's network, so a device on the wrong network cannot
/// complete it.
pub struct XamanGateway {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    api_secret: String,
}

impl XamanGateway {
    pub fn new(base_url: Url, api_key: String, api_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret,
        }
    }

    fn payload_url(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Provider(format!("invalid payload url: {e}")))
    }

    fn force_network(network: NetworkTag) -> &'static str {
        match network {
            NetworkTag::XahauMainnet => "XAHAU",
            NetworkTag::XahauTestnet => "XAHAUTESTNET",
        }
    }
}

#[derive(Deserialize)]
struct CreatedPayload {
    uuid: Uuid,
    next: NextStep,
}

#[derive(Deserialize)]
struct NextStep {
    always: String,
}

#[derive(Deserialize)]
struct PayloadStatus {
    meta: PayloadMeta,
    response: PayloadResponse,
}

#[derive(Deserialize)]
struct PayloadMeta {
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    signed: bool,
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    expired: bool,
}

#[derive(Deserialize)]
struct PayloadResponse {
    txid: Option<String>,
    dispatched_result: Option<String>,
}

#[async_trait]
impl WalletApi for XamanGateway {
    async fn prepare_sign(
        &self,
        tx: &UnsignedTransaction,
        account: &str,
        network: NetworkTag,
    ) -> Result<PreparedPayload, GatewayError> {
        let url = self.payload_url("platform/payload")?;
        let body = json!({
            "txjson": tx,
            "options": {
                "submit": true,
                "force_network": Self::force_network(network),
                "signers": [account],
            },
        });

        let response = self
            .client
            .post(url)
            .header("X-API-Key", &self.api_key)
            .header("X-API-Secret", &self.api_secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("could not register payload: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider(format!(
                "payload service answered {}",
                response.status()
            )));
        }

        let created: CreatedPayload = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("malformed payload response: {e}")))?;

        Ok(PreparedPayload {
            payload_ref: created.uuid,
            follow_up: Some(created.next.always),
        })
    }

    async fn await_result(&self, payload_ref: Uuid) -> Result<SignedOutcome, GatewayError> {
        let url = self.payload_url(&format!("platform/payload/{payload_ref}"))?;

        loop {
            let response = self
                .client
                .get(url.clone())
                .header("X-API-Key", &self.api_key)
                .header("X-API-Secret", &self.api_secret)
                .send()
                .await
                .map_err(|e| GatewayError::Provider(format!("could not poll payload: {e}")))?;

            if !response.status().is_success() {
                return Err(GatewayError::Provider(format!(
                    "payload service answered {}",
                    response.status()
                )));
            }

            let status: PayloadStatus = response
                .json()
                .await
                .map_err(|e| GatewayError::Provider(format!("malformed payload status: {e}")))?;

            if status.meta.cancelled {
                return Err(GatewayError::Cancelled);
            }
            if status.meta.expired {
                return Err(GatewayError::Expired);
            }
            if status.meta.resolved {
                if !status.meta.signed {
                    return Err(GatewayError::Rejected);
                }

                let tx_hash = status.response.txid.ok_or_else(|| {
                    GatewayError::Provider("signed payload carried no tx hash".to_string())
                })?;

                return Ok(SignedOutcome {
                    tx_hash,
                    engine_result: status.response.dispatched_result,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn cancel(&self, payload_ref: Uuid) {
        let Ok(url) = self.payload_url(&format!("platform/payload/{payload_ref}")) else {
            return;
        };

        let result = self
            .client
            .delete(url)
            .header("X-API-Key", &self.api_key)
            .header("X-API-Secret", &self.api_secret)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(%payload_ref, "Could not cancel payload with the wallet service: {e}");
        }
    }
}
