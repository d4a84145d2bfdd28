use crate::schema::notifications;
use crate::schema::sql_types::NotificationKindType;
use anyhow::ensure;
use anyhow::Result;
use diesel::query_builder::QueryId;
use diesel::AsExpression;
use diesel::ExpressionMethods;
use diesel::FromSqlRow;
use diesel::Insertable;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::QueryResult;
use diesel::Queryable;
use diesel::RunQueryDsl;
use std::any::TypeId;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = NotificationKindType)]
pub enum NotificationKind {
    ClosureRequest,
    ClosureScheduled,
    ClosureCompleted,
    OrphanImported,
}

impl QueryId for NotificationKindType {
    type QueryId = NotificationKindType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct Notification {
    pub id: i32,
    pub recipient_party: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: OffsetDateTime,
}

impl Notification {
    pub fn to_common(&self) -> payroll_commons::Notification {
        payroll_commons::Notification {
            id: self.id,
            recipient_party: self.recipient_party.clone(),
            kind: match self.kind {
                NotificationKind::ClosureRequest => {
                    payroll_commons::NotificationKind::ClosureRequest
                }
                NotificationKind::ClosureScheduled => {
                    payroll_commons::NotificationKind::ClosureScheduled
                }
                NotificationKind::ClosureCompleted => {
                    payroll_commons::NotificationKind::ClosureCompleted
                }
                NotificationKind::OrphanImported => {
                    payroll_commons::NotificationKind::OrphanImported
                }
            },
            payload: self.payload.clone(),
            read: self.read,
            created_at: self.created_at,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub recipient_party: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

pub fn insert(conn: &mut PgConnection, notification: NewNotification) -> QueryResult<Notification> {
    diesel::insert_into(notifications::table)
        .values(notification)
        .get_result(conn)
}

pub fn list_for_party(
    conn: &mut PgConnection,
    recipient_party: &str,
) -> QueryResult<Vec<Notification>> {
    notifications::table
        .filter(notifications::recipient_party.eq(recipient_party))
        .order(notifications::created_at.desc())
        .load(conn)
}

pub fn mark_read(conn: &mut PgConnection, id: i32) -> Result<()> {
    let affected_rows = diesel::update(notifications::table.find(id))
        .set(notifications::read.eq(true))
        .execute(conn)?;

    ensure!(affected_rows > 0, "No notification with id {id}");

    Ok(())
}
