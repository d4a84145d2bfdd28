use crate::schema::payment_channels;
use crate::schema::sql_types::ChannelStatusType;
use anyhow::ensure;
use anyhow::Result;
use diesel::query_builder::QueryId;
use diesel::AsExpression;
use diesel::BoolExpressionMethods;
use diesel::ExpressionMethods;
use diesel::FromSqlRow;
use diesel::Insertable;
use diesel::OptionalExtension;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::QueryResult;
use diesel::Queryable;
use diesel::RunQueryDsl;
use payroll_commons::ChannelId;
use rust_decimal::Decimal;
use std::any::TypeId;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = ChannelStatusType)]
pub enum ChannelStatus {
    /// `PaymentChannelCreate` submitted, channel id not yet resolved. The
    /// only state in which `channel_id` may be NULL.
    PendingCreate,
    Active,
    /// Source-scheduled closure; the ledger entry persists until expiration.
    Closing,
    Closed,
    FailedCreate,
}

impl QueryId for ChannelStatusType {
    type QueryId = ChannelStatusType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct Channel {
    pub id: i32,
    pub channel_id: Option<String>,
    pub organization_id: i32,
    pub employee_id: i32,
    pub job_name: String,
    pub hourly_rate: Decimal,
    pub escrow_funded_amount: Decimal,
    pub off_chain_accumulated_balance: Decimal,
    pub on_chain_balance: Decimal,
    pub legacy_accumulated_balance: Option<Decimal>,
    pub settle_delay_seconds: i64,
    pub cancel_after_ripple_time: Option<i64>,
    pub expiration_ripple_time: Option<i64>,
    pub public_key: Option<String>,
    pub status: ChannelStatus,
    pub create_tx_hash: Option<String>,
    pub closure_tx_hash: Option<String>,
    pub closure_reason: Option<String>,
    pub closure_requested_at: Option<OffsetDateTime>,
    pub imported: bool,
    pub last_ledger_sync: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub closed_at: Option<OffsetDateTime>,
}

impl Channel {
    /// Escrow not yet paid out through the off-chain balance.
    pub fn remaining_escrow(&self) -> Decimal {
        self.escrow_funded_amount - self.off_chain_accumulated_balance
    }

    pub fn to_common(
        &self,
        organization_wallet: &str,
        worker_wallet: &str,
    ) -> payroll_commons::Channel {
        payroll_commons::Channel {
            id: self.id,
            channel_id: self
                .channel_id
                .as_deref()
                .and_then(|id| ChannelId::new(id).ok()),
            organization_wallet: organization_wallet.to_string(),
            worker_wallet: worker_wallet.to_string(),
            job_name: self.job_name.clone(),
            hourly_rate: self.hourly_rate,
            escrow_funded_amount: self.escrow_funded_amount,
            off_chain_accumulated_balance: self.off_chain_accumulated_balance,
            on_chain_balance: self.on_chain_balance,
            settle_delay_seconds: self.settle_delay_seconds,
            cancel_after_ripple_time: self.cancel_after_ripple_time,
            expiration_ripple_time: self.expiration_ripple_time,
            status: match self.status {
                ChannelStatus::PendingCreate => payroll_commons::ChannelStatus::PendingCreate,
                ChannelStatus::Active => payroll_commons::ChannelStatus::Active,
                ChannelStatus::Closing => payroll_commons::ChannelStatus::Closing,
                ChannelStatus::Closed => payroll_commons::ChannelStatus::Closed,
                ChannelStatus::FailedCreate => payroll_commons::ChannelStatus::FailedCreate,
            },
            closure_tx_hash: self.closure_tx_hash.clone(),
            imported: self.imported,
            closure_requested_at: self.closure_requested_at,
            last_ledger_sync: self.last_ledger_sync,
            created_at: self.created_at,
            closed_at: self.closed_at,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = payment_channels)]
pub struct NewChannel {
    pub channel_id: Option<String>,
    pub organization_id: i32,
    pub employee_id: i32,
    pub job_name: String,
    pub hourly_rate: Decimal,
    pub escrow_funded_amount: Decimal,
    pub off_chain_accumulated_balance: Decimal,
    pub on_chain_balance: Decimal,
    pub settle_delay_seconds: i64,
    pub cancel_after_ripple_time: Option<i64>,
    pub public_key: Option<String>,
    pub status: ChannelStatus,
    pub imported: bool,
}

pub fn insert(conn: &mut PgConnection, channel: NewChannel) -> QueryResult<Channel> {
    diesel::insert_into(payment_channels::table)
        .values(channel)
        .get_result(conn)
}

pub fn get(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Channel>> {
    payment_channels::table.find(id).first(conn).optional()
}

/// Reads a channel row with a row-level lock, serializing the whole
/// transition computation against concurrent writers. Must run inside a
/// transaction.
pub fn get_for_update(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Channel>> {
    payment_channels::table
        .find(id)
        .for_update()
        .first(conn)
        .optional()
}

pub fn get_by_channel_id(
    conn: &mut PgConnection,
    channel_id: &ChannelId,
) -> QueryResult<Option<Channel>> {
    payment_channels::table
        .filter(payment_channels::channel_id.eq(channel_id.as_str()))
        .first(conn)
        .optional()
}

pub fn list_by_organization(
    conn: &mut PgConnection,
    organization_id: i32,
) -> QueryResult<Vec<Channel>> {
    payment_channels::table
        .filter(payment_channels::organization_id.eq(organization_id))
        .order(payment_channels::id.asc())
        .load(conn)
}

/// Channels an organization-wide sync has to reconcile against the ledger.
pub fn list_open_by_organization(
    conn: &mut PgConnection,
    organization_id: i32,
) -> QueryResult<Vec<Channel>> {
    payment_channels::table
        .filter(
            payment_channels::organization_id.eq(organization_id).and(
                payment_channels::status
                    .eq(ChannelStatus::Active)
                    .or(payment_channels::status.eq(ChannelStatus::Closing)),
            ),
        )
        .load(conn)
}

pub fn set_create_tx_hash(conn: &mut PgConnection, id: i32, tx_hash: &str) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::PendingCreate)),
    )
    .set((
        payment_channels::create_tx_hash.eq(tx_hash),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not record create tx hash");

    Ok(())
}

/// Promotes a pending channel to active once the ledger-assigned id is
/// known. The id is immutable from here on.
pub fn mark_active(
    conn: &mut PgConnection,
    id: i32,
    channel_id: &ChannelId,
    public_key: &str,
    on_chain_balance: Decimal,
) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::PendingCreate)),
    )
    .set((
        payment_channels::channel_id.eq(channel_id.as_str()),
        payment_channels::public_key.eq(public_key),
        payment_channels::status.eq(ChannelStatus::Active),
        payment_channels::on_chain_balance.eq(on_chain_balance),
        payment_channels::last_ledger_sync.eq(OffsetDateTime::now_utc()),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not mark channel {id} active");

    Ok(())
}

pub fn mark_failed_create(conn: &mut PgConnection, id: i32) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::PendingCreate)),
    )
    .set((
        payment_channels::status.eq(ChannelStatus::FailedCreate),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not mark channel {id} failed");

    Ok(())
}

pub fn set_closure_requested(conn: &mut PgConnection, id: i32) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::Active)),
    )
    .set((
        payment_channels::closure_requested_at.eq(OffsetDateTime::now_utc()),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(
        affected_rows > 0,
        "Could not record closure request for channel {id}"
    );

    Ok(())
}

/// Transitions an active channel into `Closing` after a validated
/// source-scheduled claim. The ledger entry persists until expiration.
pub fn mark_closing(
    conn: &mut PgConnection,
    id: i32,
    closure_tx_hash: &str,
    expiration_ripple_time: i64,
) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::Active)),
    )
    .set((
        payment_channels::status.eq(ChannelStatus::Closing),
        payment_channels::closure_tx_hash.eq(closure_tx_hash),
        payment_channels::expiration_ripple_time.eq(expiration_ripple_time),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not mark channel {id} closing");

    Ok(())
}

/// Terminal transition. A successful claim settles the worker's earned
/// balance, so the off-chain balance is zeroed; the anomalous `vanished`
/// path keeps it for the operator to resolve.
pub fn mark_closed(
    conn: &mut PgConnection,
    id: i32,
    closure_tx_hash: Option<&str>,
    closure_reason: Option<&str>,
    zero_off_chain: bool,
) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.ne(ChannelStatus::Closed)),
    )
    .set((
        payment_channels::status.eq(ChannelStatus::Closed),
        payment_channels::closure_tx_hash.eq(closure_tx_hash),
        payment_channels::closure_reason.eq(closure_reason),
        payment_channels::closed_at.eq(now),
        payment_channels::updated_at.eq(now),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not mark channel {id} closed");

    if zero_off_chain {
        diesel::update(payment_channels::table.find(id))
            .set(payment_channels::off_chain_accumulated_balance.eq(Decimal::ZERO))
            .execute(conn)?;
    }

    Ok(())
}

/// Adds accrued wages to the off-chain balance. The caller has already
/// clamped `earned` to the remaining escrow under the row lock.
pub fn apply_accrual(conn: &mut PgConnection, id: i32, earned: Decimal) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::Active)),
    )
    .set((
        payment_channels::off_chain_accumulated_balance
            .eq(payment_channels::off_chain_accumulated_balance + earned),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not accrue on channel {id}");

    Ok(())
}

/// Raises the escrow after a validated `PaymentChannelFund`.
pub fn add_escrow(conn: &mut PgConnection, id: i32, amount: Decimal) -> Result<()> {
    let affected_rows = diesel::update(
        payment_channels::table
            .find(id)
            .filter(payment_channels::status.eq(ChannelStatus::Active)),
    )
    .set((
        payment_channels::escrow_funded_amount
            .eq(payment_channels::escrow_funded_amount + amount),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not add escrow to channel {id}");

    Ok(())
}

/// Refreshes the on-chain mirror. The only writer of `on_chain_balance`
/// is the reconciler; the off-chain balance is deliberately untouched.
pub fn update_ledger_sync(
    conn: &mut PgConnection,
    id: i32,
    on_chain_balance: Decimal,
    expiration_ripple_time: Option<i64>,
) -> Result<()> {
    let affected_rows = diesel::update(payment_channels::table.find(id))
        .set((
        payment_channels::on_chain_balance.eq(on_chain_balance),
        payment_channels::expiration_ripple_time.eq(expiration_ripple_time),
        payment_channels::last_ledger_sync.eq(OffsetDateTime::now_utc()),
        payment_channels::updated_at.eq(OffsetDateTime::now_utc()),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not record sync for channel {id}");

    Ok(())
}
