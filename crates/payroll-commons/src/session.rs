use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockInParams {
    pub employee_wallet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// A work session as served by the engine's read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: i32,
    pub channel_id: i32,
    pub employee_wallet: String,
    #[serde(with = "time::serde::rfc3339")]
    pub clock_in: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub clock_out: Option<OffsetDateTime>,
    /// Fractional hours, six decimals.
    pub hours: Option<Decimal>,
    pub status: SessionStatus,
    pub closing_reason: Option<String>,
}

/// Outcome of a clock-out, including how much was accrued into the
/// channel's off-chain balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockOutOutcome {
    pub session: WorkSession,
    pub earned: Decimal,
    pub off_chain_accumulated_balance: Decimal,
    /// Set when the accrual was clamped to the remaining escrow.
    pub escrow_cap_reached: bool,
}
