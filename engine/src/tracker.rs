use crate::db;
use crate::db::channels::Channel;
use crate::db::channels::ChannelStatus;
use crate::db::work_sessions::NewWorkSession;
use crate::db::work_sessions::SessionStatus;
use crate::db::work_sessions::WorkSession;
use crate::error::LifecycleError;
use anyhow::Context;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::Connection;
use diesel::PgConnection;
use payroll_commons::ClockOutOutcome;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

const SECONDS_PER_HOUR: i64 = 3600;
const ESCROW_CAP_REASON: &str = "escrow_cap_reached";

/// Fractional hours between clock-in and clock-out, six decimals.
fn compute_hours(clock_in: OffsetDateTime, clock_out: OffsetDateTime) -> Decimal {
    let seconds = (clock_out - clock_in).whole_seconds().max(0);
    (Decimal::from(seconds) / Decimal::from(SECONDS_PER_HOUR)).round_dp(6)
}

/// Wages for a session, clamped so the off-chain balance can never exceed
/// the escrow. Returns the accrued amount and whether the cap was hit.
fn compute_accrual(
    hours: Decimal,
    hourly_rate: Decimal,
    remaining_escrow: Decimal,
) -> (Decimal, bool) {
    let earned = (hours * hourly_rate).round_dp(8);
    if earned > remaining_escrow {
        (remaining_escrow, true)
    } else {
        (earned, false)
    }
}

fn day_start(now: OffsetDateTime) -> OffsetDateTime {
    now.date().midnight().assume_utc()
}

/// Clock-in/out per channel with daily-hour caps and accrual into the
/// channel's off-chain balance.
pub struct Tracker {
    pool: Pool<ConnectionManager<PgConnection>>,
    max_daily_hours: Decimal,
}

impl Tracker {
    pub fn new(pool: Pool<ConnectionManager<PgConnection>>, max_daily_hours: u32) -> Self {
        Self {
            pool,
            max_daily_hours: Decimal::from(max_daily_hours),
        }
    }

    pub async fn clock_in(
        &self,
        channel_pk: i32,
        employee_wallet: String,
    ) -> Result<payroll_commons::WorkSession, LifecycleError> {
        let pool = self.pool.clone();
        let max_daily_hours = self.max_daily_hours;

        spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let channel = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                if channel.status != ChannelStatus::Active {
                    return Err(LifecycleError::InvalidParameters(
                        "channel is not active".to_string(),
                    ));
                }

                let employee = db::employees::get(conn, channel.employee_id)?
                    .context("Channel references a missing employee")?;
                if employee.wallet_address != employee_wallet {
                    return Err(LifecycleError::InvalidParameters(format!(
                        "wallet {employee_wallet} is not the worker on this channel"
                    )));
                }

                if db::work_sessions::get_active(conn, channel.id, employee.id)?.is_some() {
                    return Err(LifecycleError::InvalidParameters(
                        "an active work session already exists for this channel".to_string(),
                    ));
                }

                let now = OffsetDateTime::now_utc();
                let hours_today =
                    db::work_sessions::hours_since(conn, channel.id, employee.id, day_start(now))?;
                if hours_today >= max_daily_hours {
                    return Err(LifecycleError::InvalidParameters(format!(
                        "daily cap of {max_daily_hours} hours reached on this channel"
                    )));
                }

                let session = db::work_sessions::insert(
                    conn,
                    NewWorkSession {
                        channel_id: channel.id,
                        employee_id: employee.id,
                        clock_in: now,
                        status: SessionStatus::Active,
                    },
                )?;

                tracing::info!(
                    channel_id = channel.id,
                    session_id = session.id,
                    %employee_wallet,
                    "Clocked in"
                );

                Ok(session.to_common(&employee.wallet_address))
            })
        })
        .await?
    }

    /// Idempotent: a second clock-out on a completed session returns the
    /// recorded values without accruing again.
    pub async fn clock_out(&self, session_id: i32) -> Result<ClockOutOutcome, LifecycleError> {
        let pool = self.pool.clone();

        spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let session = db::work_sessions::get(conn, session_id)?
                    .ok_or(LifecycleError::NoSuchSession(session_id))?;

                let employee = db::employees::get(conn, session.employee_id)?
                    .context("Session references a missing employee")?;

                if session.status == SessionStatus::Completed {
                    let channel = db::channels::get(conn, session.channel_id)?
                        .ok_or(LifecycleError::NoSuchChannel(session.channel_id))?;
                    return Ok(ClockOutOutcome {
                        escrow_cap_reached: session.closing_reason.as_deref()
                            == Some(ESCROW_CAP_REASON),
                        earned: session.earned.unwrap_or(Decimal::ZERO),
                        off_chain_accumulated_balance: channel.off_chain_accumulated_balance,
                        session: session.to_common(&employee.wallet_address),
                    });
                }

                // The row lock serializes accrual per channel.
                let channel = db::channels::get_for_update(conn, session.channel_id)?
                    .ok_or(LifecycleError::NoSuchChannel(session.channel_id))?;
                if channel.status != ChannelStatus::Active {
                    return Err(LifecycleError::InvalidParameters(
                        "channel is not active".to_string(),
                    ));
                }

                let outcome =
                    complete_session(conn, &channel, &session, OffsetDateTime::now_utc())?;
                let session = db::work_sessions::get(conn, session_id)?
                    .context("Completed session disappeared")?;

                Ok(ClockOutOutcome {
                    escrow_cap_reached: outcome.escrow_cap_reached,
                    earned: outcome.earned,
                    off_chain_accumulated_balance: channel.off_chain_accumulated_balance
                        + outcome.earned,
                    session: session.to_common(&employee.wallet_address),
                })
            })
        })
        .await?
    }
}

pub(crate) struct CompletedAccrual {
    pub earned: Decimal,
    pub escrow_cap_reached: bool,
}

/// Completes one active session and accrues its wages under the channel row
/// lock the caller already holds. Shared between clock-out and the forced
/// completion that precedes channel closure.
pub(crate) fn complete_session(
    conn: &mut PgConnection,
    channel: &Channel,
    session: &WorkSession,
    now: OffsetDateTime,
) -> Result<CompletedAccrual, LifecycleError> {
    let hours = compute_hours(session.clock_in, now);
    let (earned, escrow_cap_reached) =
        compute_accrual(hours, channel.hourly_rate, channel.remaining_escrow());

    db::work_sessions::complete(
        conn,
        session.id,
        now,
        hours,
        earned,
        escrow_cap_reached.then_some(ESCROW_CAP_REASON),
    )?;

    if earned > Decimal::ZERO {
        db::channels::apply_accrual(conn, channel.id, earned)?;
    }

    tracing::info!(
        channel_id = channel.id,
        session_id = session.id,
        %hours,
        %earned,
        escrow_cap_reached,
        "Work session completed"
    );

    Ok(CompletedAccrual {
        earned,
        escrow_cap_reached,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn hours_are_rounded_to_six_decimals() {
        let clock_in = datetime!(2024-02-05 09:00:00 UTC);
        assert_eq!(
            compute_hours(clock_in, datetime!(2024-02-05 09:12:00 UTC)),
            dec!(0.2)
        );
        assert_eq!(
            compute_hours(clock_in, datetime!(2024-02-05 10:00:01 UTC)),
            dec!(1.000278)
        );
    }

    #[test]
    fn clock_out_before_clock_in_yields_zero_hours() {
        let clock_in = datetime!(2024-02-05 09:00:00 UTC);
        assert_eq!(
            compute_hours(clock_in, datetime!(2024-02-05 08:59:00 UTC)),
            Decimal::ZERO
        );
    }

    #[test]
    fn accrual_is_hours_times_rate() {
        let (earned, capped) = compute_accrual(dec!(0.2), dec!(15), dec!(240));
        assert_eq!(earned, dec!(3));
        assert!(!capped);
    }

    #[test]
    fn accrual_is_clamped_to_remaining_escrow() {
        let (earned, capped) = compute_accrual(dec!(8), dec!(15), dec!(100));
        assert_eq!(earned, dec!(100));
        assert!(capped);

        // Exactly hitting the escrow is not a clamp.
        let (earned, capped) = compute_accrual(dec!(8), dec!(15), dec!(120));
        assert_eq!(earned, dec!(120));
        assert!(!capped);
    }

    #[test]
    fn zero_remaining_escrow_accrues_nothing() {
        let (earned, capped) = compute_accrual(dec!(1), dec!(15), Decimal::ZERO);
        assert_eq!(earned, Decimal::ZERO);
        assert!(capped);
    }

    #[test]
    fn day_start_is_utc_midnight() {
        let now = datetime!(2024-02-05 17:45:12 UTC);
        assert_eq!(day_start(now), datetime!(2024-02-05 00:00:00 UTC));
    }
}
