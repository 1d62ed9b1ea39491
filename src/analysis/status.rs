//! Estimate variance classification and its display strings.

use crate::models::Status;
use rust_decimal::Decimal;

/// Buckets estimated vs. actual hours.
///
/// `diff = estimated - actual`: negative is over, less than 10% of the
/// estimate left is close, anything else is under. A zero estimate with
/// zero actual is close.
pub fn classify(estimated: Decimal, actual: Decimal) -> Status {
    let diff = estimated - actual;
    let close_margin = estimated * Decimal::new(1, 1);

    if diff < Decimal::ZERO {
        Status::Over
    } else if diff < close_margin || estimated.is_zero() {
        Status::Close
    } else {
        Status::Under
    }
}

/// Integer display for whole numbers, two decimals otherwise.
pub fn format_decimal(value: Decimal) -> String {
    if value.fract().is_zero() {
        value.trunc().normalize().to_string()
    } else {
        format!("{:.2}", value.round_dp(2))
    }
}

/// `"s"` unless the integer part of `value` is exactly one.
pub fn plural_suffix(value: Decimal) -> &'static str {
    if value.trunc() == Decimal::ONE {
        ""
    } else {
        "s"
    }
}

/// `"<N> hour<s> over|under"` for the gap between estimate and actual.
pub fn status_text(estimated: Decimal, actual: Decimal) -> String {
    let diff = estimated - actual;
    let direction = if diff < Decimal::ZERO { "over" } else { "under" };
    let hours = diff.abs().round_dp(2);

    format!(
        "{} hour{} {}",
        format_decimal(hours),
        plural_suffix(hours),
        direction
    )
}

/// `"<N> item<s> <bucket>"`.
pub fn item_count_text(count: usize, status: Status) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{} item{} {}", count, suffix, status)
}
