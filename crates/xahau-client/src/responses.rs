use serde::Deserialize;
use serde_json::Value;

/// Engine result code reported for a transaction that applied successfully.
pub const TES_SUCCESS: &str = "tesSUCCESS";

/// Raw WebSocket response frame. `id` echoes the request id; `status` is
/// either `success` or `error`.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    pub id: Option<u64>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Result of a `submit` call. The transaction was accepted by the node;
/// `validated` only becomes true once it made it into a closed ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOutcome {
    pub engine_result: String,
    #[serde(default)]
    pub accepted: bool,
    /// Almost always false at submit time; validation happens when the
    /// transaction makes it into a closed ledger.
    #[serde(default)]
    pub validated: bool,
    pub tx_json: SubmittedTx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedTx {
    pub hash: String,
}

/// Result of a `tx` call.
#[derive(Debug, Clone, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub validated: bool,
    pub hash: Option<String>,
    pub ledger_index: Option<i64>,
    pub meta: Option<TransactionMeta>,
    /// Transaction `Amount` field, drops. Present for creates and funds.
    #[serde(rename = "Amount")]
    pub amount: Option<String>,
    /// Transaction `Channel` field. Present for claims and funds.
    #[serde(rename = "Channel")]
    pub channel: Option<String>,
}

impl TxResult {
    /// The engine result recorded in the transaction metadata, verbatim.
    pub fn transaction_result(&self) -> Option<&str> {
        self.meta.as_ref().map(|meta| meta.transaction_result.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.transaction_result() == Some(TES_SUCCESS)
    }

    /// The ledger index of a `PayChannel` entry created by this transaction.
    ///
    /// That index is the canonical channel id assigned by the ledger.
    pub fn created_pay_channel_id(&self) -> Option<&str> {
        let meta = self.meta.as_ref()?;
        meta.affected_nodes.iter().find_map(|node| {
            let created = node.created_node.as_ref()?;
            (created.ledger_entry_type == "PayChannel").then_some(created.ledger_index.as_str())
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMeta {
    #[serde(rename = "TransactionResult")]
    pub transaction_result: String,
    #[serde(rename = "AffectedNodes", default)]
    pub affected_nodes: Vec<AffectedNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AffectedNode {
    #[serde(rename = "CreatedNode")]
    pub created_node: Option<NodeSummary>,
    #[serde(rename = "ModifiedNode")]
    pub modified_node: Option<NodeSummary>,
    #[serde(rename = "DeletedNode")]
    pub deleted_node: Option<NodeSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSummary {
    #[serde(rename = "LedgerEntryType")]
    pub ledger_entry_type: String,
    #[serde(rename = "LedgerIndex")]
    pub ledger_index: String,
    #[serde(rename = "NewFields")]
    pub new_fields: Option<Value>,
}

/// Wrapper around the `ledger_entry` result.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntryResult {
    pub node: ChannelEntry,
    pub ledger_index: Option<i64>,
}

/// A `PayChannel` ledger entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelEntry {
    pub account: String,
    pub destination: String,
    /// Total escrowed amount in drops.
    pub amount: String,
    /// Amount already paid out to the destination, in drops.
    pub balance: String,
    pub public_key: String,
    pub settle_delay: u32,
    /// Set only once the source has scheduled closure, in Ripple seconds.
    pub expiration: Option<i64>,
    pub cancel_after: Option<i64>,
    #[serde(rename = "index")]
    pub index: Option<String>,
}

/// Result of an `account_channels` call.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountChannelsResult {
    pub account: String,
    #[serde(default)]
    pub channels: Vec<AccountChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountChannel {
    pub channel_id: String,
    pub account: String,
    pub destination_account: String,
    pub amount: String,
    pub balance: String,
    pub settle_delay: u32,
    pub public_key_hex: Option<String>,
    pub public_key: Option<String>,
    pub expiration: Option<i64>,
    pub cancel_after: Option<i64>,
}

impl AccountChannel {
    /// The channel key in the hex form a claim's `PublicKey` field expects.
    pub fn claim_public_key(&self) -> Option<&str> {
        self.public_key_hex.as_deref().or(self.public_key.as_deref())
    }
}

/// Result of an `account_info` call.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfoResult {
    pub account_data: AccountData,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountData {
    pub account: String,
    /// Spendable account balance in drops.
    pub balance: String,
    pub sequence: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_pay_channel_id_is_extracted_from_metadata() {
        let result: TxResult = serde_json::from_value(serde_json::json!({
            "validated": true,
            "hash": "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7",
            "ledger_index": 56865245,
            "meta": {
                "TransactionResult": "tesSUCCESS",
                "AffectedNodes": [
                    {
                        "ModifiedNode": {
                            "LedgerEntryType": "AccountRoot",
                            "LedgerIndex": "1ED8DDFD80F275CB1CE7F18BB9D906655DE8029805D8B95FB9020B30425821EB"
                        }
                    },
                    {
                        "CreatedNode": {
                            "LedgerEntryType": "PayChannel",
                            "LedgerIndex": "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198",
                            "NewFields": {
                                "Amount": "240000000",
                                "SettleDelay": 3600
                            }
                        }
                    }
                ]
            }
        }))
        .unwrap();

        assert!(result.validated);
        assert!(result.is_success());
        assert_eq!(
            result.created_pay_channel_id(),
            Some("C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198")
        );
    }

    #[test]
    fn tx_without_metadata_has_no_channel_id() {
        let result: TxResult = serde_json::from_value(serde_json::json!({
            "validated": false,
            "hash": "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7"
        }))
        .unwrap();

        assert!(!result.validated);
        assert_eq!(result.transaction_result(), None);
        assert_eq!(result.created_pay_channel_id(), None);
    }

    #[test]
    fn failed_engine_result_is_reported_verbatim() {
        let result: TxResult = serde_json::from_value(serde_json::json!({
            "validated": true,
            "meta": { "TransactionResult": "tecNO_PERMISSION", "AffectedNodes": [] }
        }))
        .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.transaction_result(), Some("tecNO_PERMISSION"));
    }

    #[test]
    fn channel_entry_deserializes_ledger_fields() {
        let entry: ChannelEntry = serde_json::from_value(serde_json::json!({
            "Account": "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx",
            "Destination": "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx",
            "Amount": "240000000",
            "Balance": "3000000",
            "PublicKey": "32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A",
            "SettleDelay": 3600,
            "Expiration": 750003600,
            "LedgerEntryType": "PayChannel",
            "index": "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198"
        }))
        .unwrap();

        assert_eq!(entry.amount, "240000000");
        assert_eq!(entry.balance, "3000000");
        assert_eq!(entry.expiration, Some(750003600));
    }

    #[test]
    fn account_channel_prefers_the_hex_key() {
        let channel: AccountChannel = serde_json::from_value(serde_json::json!({
            "channel_id": "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198",
            "account": "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx",
            "destination_account": "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx",
            "amount": "240000000",
            "balance": "0",
            "settle_delay": 3600,
            "public_key": "aB44YfzW24VDEJQ2UuLPV2PvqcPCSoLnL7y5M1EzhdW4LnK5xMS3",
            "public_key_hex": "32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A"
        }))
        .unwrap();

        assert_eq!(
            channel.claim_public_key(),
            Some("32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A")
        );
    }
}
