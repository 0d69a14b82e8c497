//! Business status transitions
//!
//! A distribution decision computes a status from region and resource fit;
//! [`guard`] then decides whether it may replace the stored one. Metric
//! reports take a separate, narrower path through [`MetricsVerdict`].

mod metrics;

pub use metrics::{client_id_tag, split_client_ids, MetricsVerdict};

use fleet_core::BizStatus;

/// Status of a node in a served region, before any app has started
pub fn state_before_init(resource_match: bool) -> BizStatus {
    if resource_match {
        BizStatus::Initing
    } else {
        BizStatus::NoTask
    }
}

/// The status to store after a distribution decision.
///
/// A node already waiting on an audit is not sent back to `Initing`; any
/// other computed status replaces the stored one.
pub fn guard(previous: Option<BizStatus>, computed: BizStatus) -> BizStatus {
    match previous {
        Some(prev) if prev.is_audit_pending() && computed == BizStatus::Initing => prev,
        _ => computed,
    }
}
