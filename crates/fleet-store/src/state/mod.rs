//! Typed repository over a [`KvBackend`].

mod apps;
mod durations;
mod identity;
mod nodes;
mod overrides;

pub use apps::NodeAppFilter;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backend::{Command, KvBackend, MemoryBackend, Reply};
use crate::error::StoreError;
use crate::keys::KeySpace;

/// Upper score bound of activity-index range queries (year 2099).
pub const INDEX_MAX_SCORE: f64 = 4_070_908_800.0;

/// Lifetime of a per-node app record after its last report.
pub const NODE_APP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable fleet state: nodes, apps, per-node app records, overrides,
/// registrations, online-duration counters and the activity indices.
///
/// Every call is bounded by a timeout; dropping the returned future
/// abandons the call.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn KvBackend>,
    keys: KeySpace,
    op_timeout: Duration,
}

impl StateStore {
    /// Create a repository over `backend`.
    pub fn new(backend: Arc<dyn KvBackend>, keys: KeySpace, op_timeout: Duration) -> Self {
        Self {
            backend,
            keys,
            op_timeout,
        }
    }

    /// A repository over a fresh in-memory backend with the bare key layout.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            KeySpace::default(),
            DEFAULT_OP_TIMEOUT,
        )
    }

    /// Key templates in use.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check the backend answers.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.run("ping", vec![Command::Ping]).await.map(|_| ())
    }

    /// Every stored key starting with `prefix` (after the deployment prefix).
    pub async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let full = format!("{}{}", self.keys.prefix(), prefix);
        match tokio::time::timeout(self.op_timeout, self.backend.scan_prefix(&full)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op: "scan_keys",
                after: self.op_timeout,
            }),
        }
    }

    /// Execute `batch` under the operation timeout.
    async fn run(&self, op: &'static str, batch: Vec<Command>) -> Result<Vec<Reply>, StoreError> {
        let expected = batch.len();
        let replies = match tokio::time::timeout(self.op_timeout, self.backend.execute(batch)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} timed out after {:?}", op, self.op_timeout);
                return Err(StoreError::Timeout {
                    op,
                    after: self.op_timeout,
                });
            }
        };
        if replies.len() != expected {
            return Err(StoreError::Unavailable(format!(
                "{}: {} replies for {} commands",
                op,
                replies.len(),
                expected
            )));
        }
        Ok(replies)
    }

    /// Execute a single command.
    async fn run_one(&self, op: &'static str, command: Command) -> Result<Reply, StoreError> {
        let mut replies = self.run(op, vec![command]).await?;
        replies
            .pop()
            .ok_or_else(|| StoreError::Unavailable(format!("{}: empty reply", op)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledBackend;

    #[async_trait::async_trait]
    impl KvBackend for StalledBackend {
        async fn execute(&self, _batch: Vec<Command>) -> Result<Vec<Reply>, StoreError> {
            std::future::pending().await
        }

        async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_ping_in_memory() {
        let store = StateStore::in_memory();
        assert!(store.ping().await.is_ok());
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_backend_times_out() {
        let store = StateStore::new(
            Arc::new(StalledBackend),
            KeySpace::default(),
            Duration::from_secs(2),
        );
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { op: "ping", .. }));
    }
}
