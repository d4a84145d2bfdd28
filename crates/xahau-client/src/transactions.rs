use serde::Deserialize;
use serde::Serialize;

/// `PaymentChannelClaim` flag clearing the channel's `Expiration`. Only the
/// channel source may set it.
pub const TF_RENEW: u32 = 0x0001_0000;

/// `PaymentChannelClaim` flag requesting channel closure.
///
/// Closes immediately when set by the destination, or when the channel holds
/// no more funds after the claim. Set by the source on a funded channel it
/// schedules closure at the previous ledger's close time plus `SettleDelay`.
pub const TF_CLOSE: u32 = 0x0002_0000;

/// Unsigned transaction templates handed to the signing ceremony.
///
/// Serialization is bit-exact against the ledger's wire format: PascalCase
/// field names, amounts as integer strings of drops, absent fields omitted
/// entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "TransactionType")]
pub enum UnsignedTransaction {
    PaymentChannelCreate(PaymentChannelCreate),
    PaymentChannelClaim(PaymentChannelClaim),
    PaymentChannelFund(PaymentChannelFund),
}

impl UnsignedTransaction {
    /// The account expected to sign this transaction.
    pub fn signing_account(&self) -> &str {
        match self {
            UnsignedTransaction::PaymentChannelCreate(tx) => &tx.account,
            UnsignedTransaction::PaymentChannelClaim(tx) => &tx.account,
            UnsignedTransaction::PaymentChannelFund(tx) => &tx.account,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentChannelCreate {
    pub account: String,
    pub destination: String,
    /// Escrowed amount in drops.
    pub amount: String,
    pub settle_delay: u32,
    /// Optional immutable self-destruct time, in Ripple epoch seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_after: Option<i64>,
    /// Left unset here; the wallet fills in the key it signs with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentChannelClaim {
    pub account: String,
    /// 64-hex channel identifier.
    pub channel: String,
    /// Cumulative amount in drops delivered to the destination, including
    /// everything delivered so far. Must be omitted when nothing is claimed;
    /// the ledger rejects `Balance = "0"` next to `tfClose` as
    /// `temBAD_AMOUNT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    /// The amount authorized by an off-ledger claim signature. Never set for
    /// plain closes; the ledger returns remaining escrow automatically and a
    /// stray `Amount` would deduct extra funds from the signer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub flags: u32,
    /// The key recorded in the channel's ledger entry, not the signer's
    /// current account key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl PaymentChannelClaim {
    /// Builds a closing claim.
    ///
    /// `balance_drops` is the worker's earned balance; `None` when nothing
    /// was earned so that the field is omitted from the wire format.
    pub fn close(
        account: String,
        channel: String,
        balance_drops: Option<u64>,
        channel_public_key: Option<String>,
    ) -> Self {
        Self {
            account,
            channel,
            balance: balance_drops.map(|drops| drops.to_string()),
            amount: None,
            flags: TF_CLOSE,
            public_key: channel_public_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentChannelFund {
    pub account: String,
    pub channel: String,
    /// Additional escrow in drops.
    pub amount: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_serializes_with_ledger_field_names() {
        let tx = UnsignedTransaction::PaymentChannelCreate(PaymentChannelCreate {
            account: "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx".to_string(),
            destination: "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx".to_string(),
            amount: "240000000".to_string(),
            settle_delay: 3600,
            cancel_after: Some(750_000_000),
            public_key: None,
        });

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["TransactionType"], "PaymentChannelCreate");
        assert_eq!(json["Account"], "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx");
        assert_eq!(json["Destination"], "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx");
        assert_eq!(json["Amount"], "240000000");
        assert_eq!(json["SettleDelay"], 3600);
        assert_eq!(json["CancelAfter"], 750_000_000_i64);
        assert!(json.get("PublicKey").is_none());
    }

    #[test]
    fn close_claim_with_balance() {
        let claim = PaymentChannelClaim::close(
            "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx".to_string(),
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198".to_string(),
            Some(3_000_000),
            Some("32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A".to_string()),
        );

        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["Balance"], "3000000");
        assert_eq!(json["Flags"], TF_CLOSE);
        assert_eq!(
            json["PublicKey"],
            "32D2471DB72B27E3310F355BB33E339BF26F8392D5A93D3BC0FC3B566612DA0F0A"
        );
        assert!(json.get("Amount").is_none());
    }

    #[test]
    fn close_claim_without_earned_balance_omits_the_field() {
        let claim = PaymentChannelClaim::close(
            "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx".to_string(),
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198".to_string(),
            None,
            None,
        );

        let json = serde_json::to_value(&claim).unwrap();
        assert!(json.get("Balance").is_none());
        assert!(json.get("Amount").is_none());
        assert_eq!(json["Flags"], TF_CLOSE);
    }

    #[test]
    fn close_flag_is_the_documented_bit() {
        assert_eq!(TF_CLOSE, 0x0002_0000);
        assert_eq!(TF_RENEW, 0x0001_0000);
    }
}
