//! Keepalive protocol
//!
//! Nodes report their device facts and app records periodically. Each
//! report is merged onto the stored node, credited as online time when it
//! follows the previous one closely enough, and answered with a hint of
//! when to report next: the short backoff after any rejection, the steady
//! interval after success.

mod accrual;
mod service;
mod sync;

pub use accrual::{accrual_seconds, MAX_ACCRUAL_GAP};
pub use service::KeepaliveService;

use fleet_core::NodeId;
use fleet_protocol::ProtocolError;
use fleet_store::StoreError;

/// Errors from handling a keepalive or metrics report
#[derive(Debug, thiserror::Error)]
pub enum KeepaliveError {
    /// The body claims a different node than the token
    #[error("node id mismatch: token {authenticated}, body {reported}")]
    NodeIdMismatch {
        authenticated: NodeId,
        reported: String,
    },

    /// The body could not be decoded
    #[error("malformed report: {0}")]
    Malformed(#[from] ProtocolError),

    /// The report carried nothing
    #[error("empty report")]
    Empty,

    /// A store call failed
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },
}

impl KeepaliveError {
    pub(crate) fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| KeepaliveError::Store { op, source }
    }

    /// Whether the caller sent something wrong, as opposed to a failure here
    pub fn is_client_error(&self) -> bool {
        !matches!(self, KeepaliveError::Store { .. })
    }
}
