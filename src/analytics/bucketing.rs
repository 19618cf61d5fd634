//! Calendar-year buckets for the review timeline.
//!
//! `unixReviewTime` holds epoch seconds. Years are always taken in UTC so the
//! same document lands in the same bucket regardless of the host time zone.

use serde_json::Value;

use super::types::{YearCount, int_field};
use crate::pipeline::Expr;

/// Field holding the review timestamp, in epoch seconds.
pub const REVIEW_TIME_FIELD: &str = "unixReviewTime";

/// `$year($toDate(unixReviewTime * 1000))`.
pub fn review_year_expr() -> Expr {
    Expr::year(Expr::to_date(Expr::multiply([
        Expr::field(REVIEW_TIME_FIELD),
        Expr::lit(1000),
    ])))
}

/// Pair each requested year with its grouped count, defaulting to 0.
///
/// `grouped` rows look like `{"_id": <year>, "count": <n>}`; rows whose `_id`
/// is not a year (documents without a timestamp) are ignored.
pub fn fill_requested_years(requested: &[i32], grouped: &[Value]) -> Vec<YearCount> {
    requested
        .iter()
        .map(|&year| {
            let count = grouped
                .iter()
                .find(|row| row.get("_id").and_then(Value::as_i64) == Some(i64::from(year)))
                .map(|row| int_field(row, "count"))
                .unwrap_or(0);
            YearCount { year, count }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
