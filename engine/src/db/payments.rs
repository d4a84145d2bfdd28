use crate::schema::payments;
use crate::schema::sql_types::PaymentKindType;
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
use std::any::TypeId;
use time::OffsetDateTime;
use xahau_client::TES_SUCCESS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = PaymentKindType)]
pub enum PaymentKind {
    Create,
    Fund,
    ClaimClose,
    ClaimOnly,
}

impl QueryId for PaymentKindType {
    type QueryId = PaymentKindType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

/// Append-only audit trail of every ledger transaction the engine observed
/// for a channel, successful or not.
#[derive(Queryable, Debug, Clone)]
pub struct PaymentEvent {
    pub id: i32,
    pub channel_id: i32,
    pub tx_hash: String,
    pub kind: PaymentKind,
    pub amount_drops: Option<i64>,
    pub result_code: Option<String>,
    pub ledger_index: Option<i64>,
    pub observed_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = payments)]
pub struct NewPaymentEvent {
    pub channel_id: i32,
    pub tx_hash: String,
    pub kind: PaymentKind,
    pub amount_drops: Option<i64>,
    pub result_code: Option<String>,
    pub ledger_index: Option<i64>,
}

pub fn insert(conn: &mut PgConnection, event: NewPaymentEvent) -> QueryResult<PaymentEvent> {
    diesel::insert_into(payments::table)
        .values(event)
        .get_result(conn)
}

pub fn list_for_channel(
    conn: &mut PgConnection,
    channel_id: i32,
) -> QueryResult<Vec<PaymentEvent>> {
    payments::table
        .filter(payments::channel_id.eq(channel_id))
        .order(payments::observed_at.asc())
        .load(conn)
}

/// The most recent successfully validated closing claim for a channel, if
/// one was recorded. Used by the reconciler to explain a vanished ledger
/// entry.
pub fn get_successful_close(
    conn: &mut PgConnection,
    channel_id: i32,
) -> QueryResult<Option<PaymentEvent>> {
    payments::table
        .filter(
            payments::channel_id
                .eq(channel_id)
                .and(payments::kind.eq(PaymentKind::ClaimClose))
                .and(payments::result_code.eq(TES_SUCCESS)),
        )
        .order(payments::observed_at.desc())
        .first(conn)
        .optional()
}
