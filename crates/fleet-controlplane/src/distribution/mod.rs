//! App distribution
//!
//! Decides which catalog apps a node should run. Selection is a pure
//! function of the catalog and what the node reports ([`DistributionEngine`]);
//! [`DistributionService`] adds the region lookup, the operator overrides,
//! the status guard and the store side effects.

mod engine;
pub mod matcher;
mod overrides;
mod service;

pub use engine::{DistributionEngine, Selection, SelectionRequest};
pub use overrides::apply_overrides;
pub use service::{Decision, DistributionRequest, DistributionService};

use fleet_store::StoreError;

use crate::keepalive::KeepaliveError;

/// Errors from a distribution decision
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("node update failed: {0}")]
    NodeUpdate(#[from] KeepaliveError),
}
