use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use rust_decimal::Decimal;
use time::OffsetDateTime;

/// Offset between the Unix epoch and the Ripple epoch (2000-01-01T00:00:00Z).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// One native unit is a million drops.
pub const DROPS_PER_UNIT: u64 = 1_000_000;

/// Converts a wall-clock instant into seconds since the Ripple epoch.
pub fn to_ripple_time(when: OffsetDateTime) -> i64 {
    when.unix_timestamp() - RIPPLE_EPOCH_OFFSET
}

/// Converts seconds since the Ripple epoch back into a wall-clock instant.
pub fn from_ripple_time(ripple_seconds: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ripple_seconds + RIPPLE_EPOCH_OFFSET)
        .context("Ripple time out of range")
}

/// Converts a native-unit amount into drops.
///
/// Fails for negative amounts and for amounts with more than six fractional
/// digits, which cannot be represented on the ledger.
pub fn native_to_drops(amount: Decimal) -> Result<u64> {
    if amount.is_sign_negative() {
        bail!("amount must not be negative: {amount}");
    }

    let drops = amount * Decimal::from(DROPS_PER_UNIT);
    if drops.normalize().scale() > 0 {
        bail!("amount has more than six fractional digits: {amount}");
    }

    drops
        .try_into()
        .with_context(|| format!("amount does not fit into drops: {amount}"))
}

/// Converts a drops amount into native units.
pub fn drops_to_native(drops: u64) -> Decimal {
    Decimal::from(drops) / Decimal::from(DROPS_PER_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ripple_epoch_round_trip() {
        let when = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let ripple = to_ripple_time(when);
        assert_eq!(ripple, 1_700_000_000 - 946_684_800);
        assert_eq!(from_ripple_time(ripple).unwrap(), when);
    }

    #[test]
    fn ripple_epoch_start_is_zero() {
        let start = OffsetDateTime::from_unix_timestamp(946_684_800).unwrap();
        assert_eq!(to_ripple_time(start), 0);
    }

    #[test]
    fn drops_round_trip_up_to_six_fractional_digits() {
        for amount in [dec!(0), dec!(3), dec!(240.000001), dec!(0.000001), dec!(15.5)] {
            let drops = native_to_drops(amount).unwrap();
            assert_eq!(drops_to_native(drops), amount.normalize());
        }
    }

    #[test]
    fn concrete_drop_values() {
        assert_eq!(native_to_drops(dec!(240)).unwrap(), 240_000_000);
        assert_eq!(native_to_drops(dec!(3)).unwrap(), 3_000_000);
        assert_eq!(drops_to_native(3_000_000), dec!(3));
    }

    #[test]
    fn sub_drop_precision_is_rejected() {
        assert!(native_to_drops(dec!(0.0000001)).is_err());
        assert!(native_to_drops(dec!(1.1234567)).is_err());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(native_to_drops(dec!(-1)).is_err());
    }
}
