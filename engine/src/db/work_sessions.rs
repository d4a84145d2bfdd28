use crate::schema::sql_types::SessionStatusType;
use crate::schema::work_sessions;
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
use rust_decimal::Decimal;
use std::any::TypeId;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = SessionStatusType)]
pub enum SessionStatus {
    Active,
    Completed,
}

impl QueryId for SessionStatusType {
    type QueryId = SessionStatusType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct WorkSession {
    pub id: i32,
    pub channel_id: i32,
    pub employee_id: i32,
    pub clock_in: OffsetDateTime,
    pub clock_out: Option<OffsetDateTime>,
    pub hours: Option<Decimal>,
    /// Amount accrued into the channel's off-chain balance by this session,
    /// after any escrow clamp.
    pub earned: Option<Decimal>,
    pub status: SessionStatus,
    pub closing_reason: Option<String>,
    pub created_at: OffsetDateTime,
}

impl WorkSession {
    pub fn to_common(&self, employee_wallet: &str) -> payroll_commons::WorkSession {
        payroll_commons::WorkSession {
            id: self.id,
            channel_id: self.channel_id,
            employee_wallet: employee_wallet.to_string(),
            clock_in: self.clock_in,
            clock_out: self.clock_out,
            hours: self.hours,
            status: match self.status {
                SessionStatus::Active => payroll_commons::SessionStatus::Active,
                SessionStatus::Completed => payroll_commons::SessionStatus::Completed,
            },
            closing_reason: self.closing_reason.clone(),
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = work_sessions)]
pub struct NewWorkSession {
    pub channel_id: i32,
    pub employee_id: i32,
    pub clock_in: OffsetDateTime,
    pub status: SessionStatus,
}

pub fn insert(conn: &mut PgConnection, session: NewWorkSession) -> QueryResult<WorkSession> {
    diesel::insert_into(work_sessions::table)
        .values(session)
        .get_result(conn)
}

pub fn get(conn: &mut PgConnection, id: i32) -> QueryResult<Option<WorkSession>> {
    work_sessions::table.find(id).first(conn).optional()
}

pub fn get_active(
    conn: &mut PgConnection,
    channel_id: i32,
    employee_id: i32,
) -> QueryResult<Option<WorkSession>> {
    work_sessions::table
        .filter(
            work_sessions::channel_id
                .eq(channel_id)
                .and(work_sessions::employee_id.eq(employee_id))
                .and(work_sessions::status.eq(SessionStatus::Active)),
        )
        .first(conn)
        .optional()
}

pub fn list_active_for_channel(
    conn: &mut PgConnection,
    channel_id: i32,
) -> QueryResult<Vec<WorkSession>> {
    work_sessions::table
        .filter(
            work_sessions::channel_id
                .eq(channel_id)
                .and(work_sessions::status.eq(SessionStatus::Active)),
        )
        .load(conn)
}

pub fn list_for_channel(conn: &mut PgConnection, channel_id: i32) -> QueryResult<Vec<WorkSession>> {
    work_sessions::table
        .filter(work_sessions::channel_id.eq(channel_id))
        .order(work_sessions::clock_in.desc())
        .load(conn)
}

/// Hours already clocked on this channel since `day_start`, counting only
/// completed sessions.
pub fn hours_since(
    conn: &mut PgConnection,
    channel_id: i32,
    employee_id: i32,
    day_start: OffsetDateTime,
) -> QueryResult<Decimal> {
    let sessions: Vec<WorkSession> = work_sessions::table
        .filter(
            work_sessions::channel_id
                .eq(channel_id)
                .and(work_sessions::employee_id.eq(employee_id))
                .and(work_sessions::clock_in.ge(day_start)),
        )
        .load(conn)?;

    Ok(sessions
        .iter()
        .filter_map(|session| session.hours)
        .sum::<Decimal>())
}

/// Completes an active session. The status filter makes a repeated
/// clock-out a no-op at the database level.
pub fn complete(
    conn: &mut PgConnection,
    id: i32,
    clock_out: OffsetDateTime,
    hours: Decimal,
    earned: Decimal,
    closing_reason: Option<&str>,
) -> Result<()> {
    let affected_rows = diesel::update(
        work_sessions::table
            .find(id)
            .filter(work_sessions::status.eq(SessionStatus::Active)),
    )
    .set((
        work_sessions::clock_out.eq(clock_out),
        work_sessions::hours.eq(hours),
        work_sessions::earned.eq(earned),
        work_sessions::status.eq(SessionStatus::Completed),
        work_sessions::closing_reason.eq(closing_reason),
    ))
    .execute(conn)?;

    ensure!(affected_rows > 0, "Could not complete session {id}");

    Ok(())
}
