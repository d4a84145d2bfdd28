use anyhow::bail;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;
use xahau_client::transactions::UnsignedTransaction;

use crate::WalletProvider;

/// The 64-hex channel identifier assigned by the ledger when a
/// `PaymentChannelCreate` validates.
///
/// Construction validates the format, so a placeholder value can never make
/// it into persistence or onto the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: &str) -> anyhow::Result<Self> {
        if id.len() != 64 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("not a 64-hex channel id: {id}");
        }

        Ok(Self(id.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        ChannelId::new(&value)
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}

/// Which side of the channel a caller acts as. The ledger enforces
/// asymmetric closure semantics between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    Source,
    Destination,
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerKind::Source => write!(f, "source"),
            CallerKind::Destination => write!(f, "destination"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    PendingCreate,
    Active,
    Closing,
    Closed,
    FailedCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannelParams {
    pub organization_wallet: String,
    pub worker_wallet: String,
    pub job_name: Option<String>,
    pub hourly_rate: Decimal,
    /// Escrow in native units.
    pub escrow_amount: Decimal,
    /// Defaults to the engine's configured settle delay when absent.
    pub settle_delay_seconds: Option<i64>,
    /// Optional ledger-level failsafe, seconds from now.
    pub cancel_after_seconds: Option<i64>,
    pub wallet_provider: Option<WalletProvider>,
}

/// An unsigned transaction handed out for the external signing ceremony,
/// plus the reference used to await its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedSigning {
    pub unsigned_tx: UnsignedTransaction,
    pub payload_ref: Uuid,
    /// QR / deep-link to drive the ceremony, when the provider has one.
    pub follow_up: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCreateParams {
    /// Hash of the validated `PaymentChannelCreate`. When absent the engine
    /// awaits the signing ceremony referenced by `payload_ref` instead.
    pub tx_hash: Option<String>,
    pub payload_ref: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseChannelParams {
    pub caller_wallet: String,
    pub caller_kind: CallerKind,
    #[serde(default)]
    pub force_close: bool,
    pub wallet_provider: Option<WalletProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCloseParams {
    pub tx_hash: Option<String>,
    pub payload_ref: Option<Uuid>,
    pub caller_kind: CallerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundChannelParams {
    /// Additional escrow in native units.
    pub amount: Decimal,
    pub wallet_provider: Option<WalletProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmFundParams {
    pub tx_hash: Option<String>,
    pub payload_ref: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannelResponse {
    pub channel: Channel,
    pub signing: PreparedSigning,
}

/// Outcome of a close request. Repeated closes on a closing or closed
/// channel return the recorded outcome instead of a new claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CloseChannelResponse {
    Prepared {
        signing: PreparedSigning,
        expected_kind: String,
    },
    AlreadyClosing {
        closure_tx_hash: Option<String>,
        expiration_ripple_time: Option<i64>,
    },
    AlreadyClosed {
        closure_tx_hash: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseConfirmationResponse {
    pub status: ChannelStatus,
    pub kind: String,
    pub closure_tx_hash: Option<String>,
    pub expiration_ripple_time: Option<i64>,
}

/// A channel as served by the engine's read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i32,
    pub channel_id: Option<ChannelId>,
    pub organization_wallet: String,
    pub worker_wallet: String,
    pub job_name: String,
    pub hourly_rate: Decimal,
    pub escrow_funded_amount: Decimal,
    pub off_chain_accumulated_balance: Decimal,
    pub on_chain_balance: Decimal,
    pub settle_delay_seconds: i64,
    pub cancel_after_ripple_time: Option<i64>,
    pub expiration_ripple_time: Option<i64>,
    pub status: ChannelStatus,
    pub closure_tx_hash: Option<String>,
    pub imported: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closure_requested_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_ledger_sync: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_requires_64_hex_characters() {
        let id = "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198";
        assert_eq!(ChannelId::new(id).unwrap().as_str(), id);

        assert!(ChannelId::new("TEMP-12345").is_err());
        assert!(ChannelId::new("").is_err());
        assert!(ChannelId::new(&id[..63]).is_err());
        assert!(ChannelId::new(&format!("{}Z", &id[..63])).is_err());
    }

    #[test]
    fn channel_id_normalizes_to_uppercase() {
        let id = ChannelId::new(
            "c1ae6dddeec05cf2978c0bad6fe302948e9533691dc749dcdd3b9e5992ca6198",
        )
        .unwrap();
        assert_eq!(
            id.as_str(),
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198"
        );
    }

    #[test]
    fn placeholder_ids_do_not_deserialize() {
        let result = serde_json::from_str::<ChannelId>(r#""TEMP-1699999999""#);
        assert!(result.is_err());
    }

    #[test]
    fn caller_kind_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&CallerKind::Source).unwrap(),
            r#""source""#
        );
        assert_eq!(
            serde_json::from_str::<CallerKind>(r#""destination""#).unwrap(),
            CallerKind::Destination
        );
    }
}
