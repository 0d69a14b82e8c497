//! Batched command interface over a key-value backend.

mod memory;
mod redis_backend;

pub use self::memory::MemoryBackend;
pub use self::redis_backend::RedisBackend;

use std::collections::HashMap;
use std::time::Duration;

use crate::error::StoreError;

/// One primitive operation on the key space.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set several fields of a hash, leaving other fields untouched.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HGetAll {
        key: String,
    },
    HGet {
        key: String,
        field: String,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    Del {
        keys: Vec<String>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    SMembers {
        key: String,
    },
    SIsMember {
        key: String,
        member: String,
    },
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// Members with `min <= score <= max`, ascending by score.
    ZRangeByScore {
        key: String,
        min: f64,
        max: f64,
    },
    Ping,
}

/// Result of one [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Acknowledgement with no payload (`SET`, `EXPIRE`, `PING`).
    Ok,
    /// Integer result, such as a counter value or a count of changes.
    Int(i64),
    Bool(bool),
    /// A string value, `None` when the key or field is absent.
    Text(Option<String>),
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

impl Reply {
    pub(crate) fn into_hash(self) -> Result<HashMap<String, String>, StoreError> {
        match self {
            Reply::Hash(map) => Ok(map),
            other => Err(unexpected("hash", other)),
        }
    }

    pub(crate) fn into_list(self) -> Result<Vec<String>, StoreError> {
        match self {
            Reply::List(items) => Ok(items),
            other => Err(unexpected("list", other)),
        }
    }

    pub(crate) fn into_text(self) -> Result<Option<String>, StoreError> {
        match self {
            Reply::Text(text) => Ok(text),
            other => Err(unexpected("text", other)),
        }
    }

    pub(crate) fn into_bool(self) -> Result<bool, StoreError> {
        match self {
            Reply::Bool(b) => Ok(b),
            Reply::Int(n) => Ok(n != 0),
            other => Err(unexpected("bool", other)),
        }
    }
}

fn unexpected(wanted: &str, got: Reply) -> StoreError {
    StoreError::Unavailable(format!("expected {} reply, got {:?}", wanted, got))
}

/// A key-value backend executing batches of commands.
///
/// A batch is sent in a single round trip and yields exactly one reply per
/// command, in order. Implementations must be `Send + Sync` for use across
/// request tasks.
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// Execute `batch` and return one reply per command.
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>, StoreError>;

    /// All keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_conversions() {
        assert!(Reply::Int(3).into_list().is_err());
        assert!(Reply::Int(1).into_bool().unwrap());
        assert_eq!(Reply::Text(None).into_text().unwrap(), None);
        assert!(Reply::Ok.into_hash().is_err());
    }
}
