//! Online-duration accrual

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Longest gap between two reports still counted as online time.
pub const MAX_ACCRUAL_GAP: Duration = Duration::from_secs(30 * 60);

/// Seconds to credit for the gap since the previous report.
///
/// `None` when the node was never seen, the clock went backwards, or the
/// gap exceeds `max_gap` (an outage is not online time).
pub fn accrual_seconds(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_gap: Duration,
) -> Option<i64> {
    let secs = (now - previous?).num_seconds();
    (secs > 0 && secs <= max_gap.as_secs() as i64).then_some(secs)
}
