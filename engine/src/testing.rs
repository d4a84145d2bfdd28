//! Programmable ledger stand-in for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use xahau_client::AccountChannel;
use xahau_client::AccountInfoResult;
use xahau_client::ChannelEntry;
use xahau_client::LedgerApi;
use xahau_client::LedgerError;
use xahau_client::SubmitOutcome;
use xahau_client::TxResult;

/// Scripted ledger responses, consumed in order per method. An exhausted
/// queue behaves like an empty validated ledger: lookups return `NotFound`
/// and enumerations return no channels.
#[derive(Default)]
pub struct MockLedger {
    pub submits: Mutex<VecDeque<Result<SubmitOutcome, LedgerError>>>,
    pub txs: Mutex<VecDeque<Result<TxResult, LedgerError>>>,
    pub channel_entries: Mutex<VecDeque<Result<ChannelEntry, LedgerError>>>,
    pub account_channels: Mutex<VecDeque<Result<Vec<AccountChannel>, LedgerError>>>,
    pub account_infos: Mutex<VecDeque<Result<AccountInfoResult, LedgerError>>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tx(&self, tx: Result<TxResult, LedgerError>) {
        self.txs.lock().push_back(tx);
    }

    pub fn push_channel_entry(&self, entry: Result<ChannelEntry, LedgerError>) {
        self.channel_entries.lock().push_back(entry);
    }

    pub fn push_account_channels(&self, channels: Result<Vec<AccountChannel>, LedgerError>) {
        self.account_channels.lock().push_back(channels);
    }

    pub fn push_account_info(&self, info: Result<AccountInfoResult, LedgerError>) {
        self.account_infos.lock().push_back(info);
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn submit(&self, _signed_blob: &str) -> Result<SubmitOutcome, LedgerError> {
        self.submits
            .lock()
            .pop_front()
            .unwrap_or(Err(LedgerError::Unreachable("no scripted submit".to_string())))
    }

    async fn fetch_tx(&self, _tx_hash: &str) -> Result<TxResult, LedgerError> {
        self.txs.lock().pop_front().unwrap_or(Err(LedgerError::NotFound))
    }

    async fn fetch_channel_entry(&self, _channel_id: &str) -> Result<ChannelEntry, LedgerError> {
        self.channel_entries
            .lock()
            .pop_front()
            .unwrap_or(Err(LedgerError::NotFound))
    }

    async fn fetch_account_channels(
        &self,
        _account: &str,
        _destination: Option<&str>,
    ) -> Result<Vec<AccountChannel>, LedgerError> {
        self.account_channels.lock().pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_account_info(&self, _account: &str) -> Result<AccountInfoResult, LedgerError> {
        self.account_infos
            .lock()
            .pop_front()
            .unwrap_or(Err(LedgerError::NotFound))
    }
}

pub const CHANNEL_ID: &str = "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198";
pub const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";
pub const SOURCE: &str = "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx";
pub const DESTINATION: &str = "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx";
pub const PUBLIC_KEY: &str = "32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A";

pub fn validated_create_tx(channel_id: &str) -> TxResult {
    serde_json::from_value(json!({
        "validated": true,
        "hash": TX_HASH,
        "ledger_index": 56865245,
        "meta": {
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [
                {
                    "CreatedNode": {
                        "LedgerEntryType": "PayChannel",
                        "LedgerIndex": channel_id,
                    }
                }
            ]
        }
    }))
    .expect("valid tx result")
}

pub fn validated_tx(result_code: &str) -> TxResult {
    serde_json::from_value(json!({
        "validated": true,
        "hash": TX_HASH,
        "ledger_index": 56865250,
        "meta": { "TransactionResult": result_code, "AffectedNodes": [] }
    }))
    .expect("valid tx result")
}

pub fn unvalidated_tx() -> TxResult {
    serde_json::from_value(json!({ "validated": false, "hash": TX_HASH }))
        .expect("valid tx result")
}

pub fn channel_entry(
    amount_drops: u64,
    balance_drops: u64,
    expiration: Option<i64>,
) -> ChannelEntry {
    serde_json::from_value(json!({
        "Account": SOURCE,
        "Destination": DESTINATION,
        "Amount": amount_drops.to_string(),
        "Balance": balance_drops.to_string(),
        "PublicKey": PUBLIC_KEY,
        "SettleDelay": 3600,
        "Expiration": expiration,
        "index": CHANNEL_ID,
    }))
    .expect("valid channel entry")
}

pub fn account_channel(channel_id: &str, amount_drops: u64, settle_delay: u32) -> AccountChannel {
    serde_json::from_value(json!({
        "channel_id": channel_id,
        "account": SOURCE,
        "destination_account": DESTINATION,
        "amount": amount_drops.to_string(),
        "balance": "0",
        "settle_delay": settle_delay,
        "public_key_hex": PUBLIC_KEY,
    }))
    .expect("valid account channel")
}

pub fn account_info(balance_drops: u64) -> AccountInfoResult {
    serde_json::from_value(json!({
        "account_data": {
            "Account": DESTINATION,
            "Balance": balance_drops.to_string(),
            "Sequence": 42,
        },
        "validated": true,
    }))
    .expect("valid account info")
}
