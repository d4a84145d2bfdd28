//! A stable and simple connection to a Xahau/XRPL node's WebSocket API.
//!
//! One socket carries all traffic; requests are multiplexed by id and
//! answered out of order. The connection task reconnects with exponential
//! backoff and fails outstanding requests so callers can apply their own
//! retry budgets.

pub mod error;
pub mod requests;
pub mod responses;
pub mod time;
pub mod transactions;

pub use error::LedgerError;
pub use responses::AccountChannel;
pub use responses::AccountInfoResult;
pub use responses::ChannelEntry;
pub use responses::SubmitOutcome;
pub use responses::TxResult;
pub use responses::TES_SUCCESS;

use crate::requests::Request;
use crate::requests::RequestEnvelope;
use crate::responses::AccountChannelsResult;
use crate::responses::LedgerEntryResult;
use crate::responses::ResponseEnvelope;
use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use url::Url;

const PING_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const SUBMIT_ATTEMPTS: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn default_ws_endpoint(&self) -> Url {
        let url = match self {
            Network::Mainnet => "wss://xahau.network",
            Network::Testnet => "wss://xahau-test.net",
        };
        Url::parse(url).expect("default endpoint to be a valid url")
    }
}

/// The ledger operations the payroll engine consumes.
///
/// Implemented by [`XahauClient`]; engine tests substitute their own
/// implementations.
#[async_trait]
pub trait LedgerApi: Send + Sync + 'static {
    /// Hands a signed transaction blob to the node. Returns once the node
    /// accepted it; validation happens asynchronously.
    async fn submit(&self, signed_blob: &str) -> Result<SubmitOutcome, LedgerError>;

    async fn fetch_tx(&self, tx_hash: &str) -> Result<TxResult, LedgerError>;

    async fn fetch_channel_entry(&self, channel_id: &str) -> Result<ChannelEntry, LedgerError>;

    async fn fetch_account_channels(
        &self,
        account: &str,
        destination: Option<&str>,
    ) -> Result<Vec<AccountChannel>, LedgerError>;

    async fn fetch_account_info(&self, account: &str) -> Result<AccountInfoResult, LedgerError>;
}

struct Call {
    request: Request,
    reply: oneshot::Sender<Result<Value, LedgerError>>,
}

/// Client for a single node. Cheap to clone; all clones share one
/// connection task.
#[derive(Clone)]
pub struct XahauClient {
    calls: mpsc::Sender<Call>,
    request_timeout: Duration,
}

impl XahauClient {
    pub fn connect(url: Url) -> Self {
        Self::with_request_timeout(url, REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(url: Url, request_timeout: Duration) -> Self {
        let (calls, call_rx) = mpsc::channel(64);
        tokio::spawn(run_connection(url, call_rx));

        Self {
            calls,
            request_timeout,
        }
    }

    async fn call(&self, request: Request) -> Result<Value, LedgerError> {
        let (reply, reply_rx) = oneshot::channel();
        self.calls
            .send(Call { request, reply })
            .await
            .map_err(|_| LedgerError::Unreachable("connection task stopped".to_string()))?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Err(_) => Err(LedgerError::Timeout(self.request_timeout)),
            Ok(Err(_)) => Err(LedgerError::Unreachable(
                "connection lost while waiting for response".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl LedgerApi for XahauClient {
    async fn submit(&self, signed_blob: &str) -> Result<SubmitOutcome, LedgerError> {
        let mut backoff = Duration::from_secs(1);
        let mut attempt = 1;
        loop {
            let result = self
                .call(Request::Submit {
                    tx_blob: signed_blob.to_string(),
                })
                .await;

            match result {
                Ok(value) => return parse(value),
                Err(e) if e.is_transient() && attempt < SUBMIT_ATTEMPTS => {
                    tracing::warn!(attempt, "Transient error submitting transaction: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_tx(&self, tx_hash: &str) -> Result<TxResult, LedgerError> {
        let value = self
            .call(Request::Tx {
                transaction: tx_hash.to_string(),
                binary: false,
            })
            .await?;
        parse(value)
    }

    async fn fetch_channel_entry(&self, channel_id: &str) -> Result<ChannelEntry, LedgerError> {
        let value = self
            .call(Request::LedgerEntry {
                payment_channel: channel_id.to_string(),
                ledger_index: "validated".to_string(),
            })
            .await?;
        let result: LedgerEntryResult = parse(value)?;
        Ok(result.node)
    }

    async fn fetch_account_channels(
        &self,
        account: &str,
        destination: Option<&str>,
    ) -> Result<Vec<AccountChannel>, LedgerError> {
        let value = self
            .call(Request::AccountChannels {
                account: account.to_string(),
                destination_account: destination.map(|d| d.to_string()),
                ledger_index: "validated".to_string(),
            })
            .await?;
        let result: AccountChannelsResult = parse(value)?;
        Ok(result.channels)
    }

    async fn fetch_account_info(&self, account: &str) -> Result<AccountInfoResult, LedgerError> {
        let value = self
            .call(Request::AccountInfo {
                account: account.to_string(),
                ledger_index: "validated".to_string(),
            })
            .await?;
        parse(value)
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, LedgerError> {
    serde_json::from_value(value)
        .map_err(|e| LedgerError::Node(format!("unexpected response shape: {e}")))
}

enum Driven {
    Shutdown,
    Reconnect,
}

async fn run_connection(url: Url, mut calls: mpsc::Receiver<Call>) {
    let mut backoff = RECONNECT_INITIAL;
    loop {
        tracing::debug!(%url, "Connecting to ledger node");
        match tokio_tungstenite::connect_async(url.clone()).await {
            Ok((socket, _)) => {
                tracing::info!(%url, "Connected to ledger node");
                backoff = RECONNECT_INITIAL;
                if let Driven::Shutdown = drive(socket, &mut calls).await {
                    tracing::debug!("All client handles dropped, stopping connection task");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(%url, "Could not connect to ledger node: {e:#}");
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

type Pending = HashMap<u64, (&'static str, oneshot::Sender<Result<Value, LedgerError>>)>;

async fn drive(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    calls: &mut mpsc::Receiver<Call>,
) -> Driven {
    let mut pending: Pending = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            call = calls.recv() => {
                let Some(Call { request, reply }) = call else {
                    return Driven::Shutdown;
                };

                next_id += 1;
                let command = request.command();
                let envelope = RequestEnvelope { id: next_id, request };
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = reply.send(Err(LedgerError::Node(format!(
                            "could not encode request: {e}"
                        ))));
                        continue;
                    }
                };

                if let Err(e) = socket.send(tungstenite::Message::Text(text)).await {
                    let _ = reply.send(Err(LedgerError::Unreachable(e.to_string())));
                    fail_pending(&mut pending);
                    return Driven::Reconnect;
                }

                pending.insert(next_id, (command, reply));
            }
            _ = tokio::time::sleep(PING_INTERVAL) => {
                tracing::trace!("No message from the node in the last 5 seconds, pinging");
                if socket.send(tungstenite::Message::Ping(Vec::new())).await.is_err() {
                    fail_pending(&mut pending);
                    return Driven::Reconnect;
                }
            }
            msg = socket.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!("Ledger connection failed: {e:#}");
                        fail_pending(&mut pending);
                        return Driven::Reconnect;
                    }
                    None => {
                        tracing::warn!("Ledger node closed the connection");
                        fail_pending(&mut pending);
                        return Driven::Reconnect;
                    }
                };

                match msg {
                    tungstenite::Message::Text(text) => route(&mut pending, &text),
                    tungstenite::Message::Pong(_) => {
                        tracing::trace!("Received pong");
                    }
                    other => {
                        tracing::trace!("Unsupported message: {:?}", other);
                    }
                }
            }
        }
    }
}

fn route(pending: &mut Pending, text: &str) {
    let envelope: ResponseEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Could not parse message from node: {e}");
            return;
        }
    };

    let Some(id) = envelope.id else {
        // Stream messages (ledger closes etc.) carry no id.
        tracing::trace!("Ignoring unsolicited message from node");
        return;
    };

    let Some((command, reply)) = pending.remove(&id) else {
        tracing::trace!(id, "Response for an abandoned request");
        return;
    };

    let outcome = match envelope.status.as_deref() {
        Some("success") => Ok(envelope.result.unwrap_or(Value::Null)),
        _ => Err(match envelope.error {
            Some(code) => LedgerError::from_node_code(command, &code),
            None => LedgerError::Node("malformed response".to_string()),
        }),
    };

    let _ = reply.send(outcome);
}

fn fail_pending(pending: &mut Pending) {
    for (_, (_, reply)) in pending.drain() {
        let _ = reply.send(Err(LedgerError::Unreachable(
            "connection lost before the node answered".to_string(),
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_slot() -> (
        oneshot::Sender<Result<Value, LedgerError>>,
        oneshot::Receiver<Result<Value, LedgerError>>,
    ) {
        oneshot::channel()
    }

    #[tokio::test]
    async fn responses_are_routed_by_id() {
        let mut pending = Pending::new();
        let (tx_a, rx_a) = reply_slot();
        let (tx_b, rx_b) = reply_slot();
        pending.insert(1, ("tx", tx_a));
        pending.insert(2, ("account_info", tx_b));

        route(
            &mut pending,
            r#"{"id":2,"status":"success","type":"response","result":{"validated":true}}"#,
        );

        assert!(pending.contains_key(&1));
        let value = rx_b.await.unwrap().unwrap();
        assert_eq!(value["validated"], true);
        drop(rx_a);
    }

    #[tokio::test]
    async fn node_errors_become_typed_failures() {
        let mut pending = Pending::new();
        let (tx, rx) = reply_slot();
        pending.insert(5, ("tx", tx));

        route(
            &mut pending,
            r#"{"id":5,"status":"error","error":"txnNotFound","type":"response"}"#,
        );

        assert!(matches!(rx.await.unwrap(), Err(LedgerError::NotFound)));
    }

    #[tokio::test]
    async fn lost_connection_fails_every_pending_request() {
        let mut pending = Pending::new();
        let (tx_a, rx_a) = reply_slot();
        let (tx_b, rx_b) = reply_slot();
        pending.insert(1, ("submit", tx_a));
        pending.insert(2, ("tx", tx_b));

        fail_pending(&mut pending);

        assert!(matches!(rx_a.await.unwrap(), Err(LedgerError::Unreachable(_))));
        assert!(matches!(rx_b.await.unwrap(), Err(LedgerError::Unreachable(_))));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn unsolicited_messages_are_ignored() {
        let mut pending = Pending::new();
        let (tx, rx) = reply_slot();
        pending.insert(1, ("tx", tx));

        route(
            &mut pending,
            r#"{"type":"ledgerClosed","ledger_index":56865245}"#,
        );

        assert!(pending.contains_key(&1));
        drop(rx);
    }
}
