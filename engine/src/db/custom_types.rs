use crate::db::channels::ChannelStatus;
use crate::db::employees::EmploymentStatus;
use crate::db::notifications::NotificationKind;
use crate::db::payments::PaymentKind;
use crate::db::work_sessions::SessionStatus;
use crate::schema::sql_types::ChannelStatusType;
use crate::schema::sql_types::EmploymentStatusType;
use crate::schema::sql_types::NotificationKindType;
use crate::schema::sql_types::PaymentKindType;
use crate::schema::sql_types::SessionStatusType;
use diesel::deserialize;
use diesel::deserialize::FromSql;
use diesel::pg::Pg;
use diesel::pg::PgValue;
use diesel::serialize;
use diesel::serialize::IsNull;
use diesel::serialize::Output;
use diesel::serialize::ToSql;
use std::io::Write;

impl ToSql<ChannelStatusType, Pg> for ChannelStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            ChannelStatus::PendingCreate => out.write_all(b"PendingCreate")?,
            ChannelStatus::Active => out.write_all(b"Active")?,
            ChannelStatus::Closing => out.write_all(b"Closing")?,
            ChannelStatus::Closed => out.write_all(b"Closed")?,
            ChannelStatus::FailedCreate => out.write_all(b"FailedCreate")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<ChannelStatusType, Pg> for ChannelStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"PendingCreate" => Ok(ChannelStatus::PendingCreate),
            b"Active" => Ok(ChannelStatus::Active),
            b"Closing" => Ok(ChannelStatus::Closing),
            b"Closed" => Ok(ChannelStatus::Closed),
            b"FailedCreate" => Ok(ChannelStatus::FailedCreate),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<SessionStatusType, Pg> for SessionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            SessionStatus::Active => out.write_all(b"Active")?,
            SessionStatus::Completed => out.write_all(b"Completed")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<SessionStatusType, Pg> for SessionStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"Active" => Ok(SessionStatus::Active),
            b"Completed" => Ok(SessionStatus::Completed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<PaymentKindType, Pg> for PaymentKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            PaymentKind::Create => out.write_all(b"Create")?,
            PaymentKind::Fund => out.write_all(b"Fund")?,
            PaymentKind::ClaimClose => out.write_all(b"ClaimClose")?,
            PaymentKind::ClaimOnly => out.write_all(b"ClaimOnly")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<PaymentKindType, Pg> for PaymentKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"Create" => Ok(PaymentKind::Create),
            b"Fund" => Ok(PaymentKind::Fund),
            b"ClaimClose" => Ok(PaymentKind::ClaimClose),
            b"ClaimOnly" => Ok(PaymentKind::ClaimOnly),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<NotificationKindType, Pg> for NotificationKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            NotificationKind::ClosureRequest => out.write_all(b"ClosureRequest")?,
            NotificationKind::ClosureScheduled => out.write_all(b"ClosureScheduled")?,
            NotificationKind::ClosureCompleted => out.write_all(b"ClosureCompleted")?,
            NotificationKind::OrphanImported => out.write_all(b"OrphanImported")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<NotificationKindType, Pg> for NotificationKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"ClosureRequest" => Ok(NotificationKind::ClosureRequest),
            b"ClosureScheduled" => Ok(NotificationKind::ClosureScheduled),
            b"ClosureCompleted" => Ok(NotificationKind::ClosureCompleted),
            b"OrphanImported" => Ok(NotificationKind::OrphanImported),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ToSql<EmploymentStatusType, Pg> for EmploymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            EmploymentStatus::Active => out.write_all(b"Active")?,
            EmploymentStatus::Inactive => out.write_all(b"Inactive")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<EmploymentStatusType, Pg> for EmploymentStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"Active" => Ok(EmploymentStatus::Active),
            b"Inactive" => Ok(EmploymentStatus::Inactive),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}
