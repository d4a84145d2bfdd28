use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::ChannelStatus;

/// Outcome of reconciling one channel against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChannelSyncReport {
    /// The ledger entry exists; the on-chain mirror was refreshed.
    Synced {
        on_chain_balance: Decimal,
        status: ChannelStatus,
        /// True when a scheduled expiration had passed and the channel was
        /// promoted to closed.
        promoted_to_closed: bool,
    },
    /// The channel was synced less than the configured interval ago.
    RecentlySynced { seconds_since: i64 },
    /// The ledger entry is gone and a recorded successful claim explains it.
    ClosedByRecordedClaim { closure_tx_hash: String },
    /// The ledger entry is gone with no recorded claim. The off-chain
    /// balance is preserved and operator action is required.
    Vanished { off_chain_preserved: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSyncEntry {
    pub channel_pk: i32,
    pub channel_id: Option<String>,
    pub report: ChannelSyncReport,
}

/// Aggregated outcome of an organization-wide sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSyncReport {
    pub synced: Vec<OrganizationSyncEntry>,
    /// Primary keys of channels imported from ledger-only entries.
    pub imported: Vec<i32>,
    /// Channels whose sync failed, with the failure text.
    pub failed: Vec<(i32, String)>,
}

/// Notification kinds delivered to workers and organizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClosureRequest,
    ClosureScheduled,
    ClosureCompleted,
    OrphanImported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i32,
    pub recipient_party: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}
