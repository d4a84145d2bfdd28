use crate::schema::employees;
use crate::schema::sql_types::EmploymentStatusType;
use anyhow::Context;
use anyhow::Result;
use diesel::query_builder::QueryId;
use diesel::AsExpression;
use diesel::BoolExpressionMethods;
use diesel::ExpressionMethods;
use diesel::FromSqlRow;
use diesel::OptionalExtension;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::QueryResult;
use diesel::Queryable;
use diesel::RunQueryDsl;
use std::any::TypeId;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, FromSqlRow, AsExpression)]
#[diesel(sql_type = EmploymentStatusType)]
pub enum EmploymentStatus {
    Active,
    Inactive,
}

impl QueryId for EmploymentStatusType {
    type QueryId = EmploymentStatusType;
    const HAS_STATIC_QUERY_ID: bool = false;

    fn query_id() -> Option<TypeId> {
        None
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct Employee {
    pub id: i32,
    pub organization_id: i32,
    pub wallet_address: String,
    pub status: EmploymentStatus,
    pub created_at: OffsetDateTime,
}

pub fn get(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Employee>> {
    employees::table.find(id).first(conn).optional()
}

pub fn get_by_wallet(
    conn: &mut PgConnection,
    organization_id: i32,
    wallet_address: &str,
) -> QueryResult<Option<Employee>> {
    employees::table
        .filter(
            employees::organization_id
                .eq(organization_id)
                .and(employees::wallet_address.eq(wallet_address)),
        )
        .first(conn)
        .optional()
}

/// Fetches the employee record for a worker wallet under an organization,
/// creating it on first use. The same worker wallet may appear under
/// multiple organizations.
pub fn get_or_create(
    conn: &mut PgConnection,
    organization_id: i32,
    wallet_address: &str,
) -> Result<Employee> {
    diesel::insert_into(employees::table)
        .values((
            employees::organization_id.eq(organization_id),
            employees::wallet_address.eq(wallet_address),
            employees::status.eq(EmploymentStatus::Active),
        ))
        .on_conflict((employees::organization_id, employees::wallet_address))
        .do_nothing()
        .execute(conn)?;

    get_by_wallet(conn, organization_id, wallet_address)?
        .with_context(|| format!("No employee for wallet {wallet_address}"))
}
