use rust_decimal::Decimal;

/// Absolute percentage change above which an alert is sent.
pub const ALERT_THRESHOLD_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Signed percentage change from `previous` to `current`.
///
/// With no previous price (zero) the difference is taken against a baseline
/// of 1 rather than a percentage, so the first observation of any non-zero
/// price reads as a very large move.
///
/// `None` when the result does not fit in a `Decimal`.
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    let divisor = if previous.is_zero() { Decimal::ONE } else { previous };
    current
        .checked_sub(previous)?
        .checked_div(divisor)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Strictly greater than the threshold; a move of exactly 5% stays quiet.
pub fn exceeds_threshold(change: Decimal) -> bool {
    change.abs() > ALERT_THRESHOLD_PERCENT
}
