use crate::schema::organizations;
use anyhow::Context;
use anyhow::Result;
use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::QueryResult;
use diesel::Queryable;
use diesel::RunQueryDsl;
use time::OffsetDateTime;

#[derive(Queryable, Debug, Clone)]
pub struct Organization {
    pub id: i32,
    pub wallet_address: String,
    pub name: String,
    pub created_at: OffsetDateTime,
}

pub fn get(conn: &mut PgConnection, id: i32) -> QueryResult<Option<Organization>> {
    organizations::table.find(id).first(conn).optional()
}

pub fn get_by_wallet(
    conn: &mut PgConnection,
    wallet_address: &str,
) -> QueryResult<Option<Organization>> {
    organizations::table
        .filter(organizations::wallet_address.eq(wallet_address))
        .first(conn)
        .optional()
}

pub fn list_all(conn: &mut PgConnection) -> QueryResult<Vec<Organization>> {
    organizations::table
        .order(organizations::id.asc())
        .load(conn)
}

/// Fetches the organization for an escrow wallet, creating it on first use.
pub fn get_or_create(conn: &mut PgConnection, wallet_address: &str) -> Result<Organization> {
    diesel::insert_into(organizations::table)
        .values((
            organizations::wallet_address.eq(wallet_address),
            organizations::name.eq(wallet_address),
        ))
        .on_conflict(organizations::wallet_address)
        .do_nothing()
        .execute(conn)?;

    get_by_wallet(conn, wallet_address)?
        .with_context(|| format!("No organization for wallet {wallet_address}"))
}
