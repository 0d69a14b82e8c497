//! In-memory key-value backend.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{Command, KvBackend, Reply};
use crate::error::StoreError;

enum Value {
    Text(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    Sorted(HashMap<String, f64>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

/// In-memory backend with the same semantics as the redis backend.
///
/// Each batch runs under one lock, so unlike a redis pipeline it is also
/// atomic. Expired keys are dropped lazily when touched. Useful for tests
/// and single-process deployments.
pub struct MemoryBackend {
    keyspace: Mutex<Keyspace>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let mut keyspace = self.keyspace.lock();
        keyspace.purge_expired(Instant::now());
        keyspace.entries.len()
    }

    /// Whether no live key exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    fn purge_expired(&mut self, now: Instant) {
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn hash_mut(&mut self, key: &str, now: Instant) -> Result<&mut HashMap<String, String>, StoreError> {
        if self.live(key, now).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(map)) => Ok(map),
            _ => Err(wrong_type(key)),
        }
    }

    fn set_mut(&mut self, key: &str, now: Instant) -> Result<&mut BTreeSet<String>, StoreError> {
        if self.live(key, now).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => Ok(set),
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_mut(&mut self, key: &str, now: Instant) -> Result<&mut HashMap<String, f64>, StoreError> {
        if self.live(key, now).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Sorted(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Sorted(zset)) => Ok(zset),
            _ => Err(wrong_type(key)),
        }
    }

    fn counter(&mut self, key: &str, delta: i64, now: Instant) -> Result<i64, StoreError> {
        let current = match self.live(key, now).map(|e| &e.value) {
            None => 0,
            Some(Value::Text(text)) => text
                .parse::<i64>()
                .map_err(|_| StoreError::corrupt(key, "value is not an integer"))?,
            Some(_) => return Err(wrong_type(key)),
        };
        let next = current + delta;
        let expires_at = self.entries.get(key).and_then(|e| e.expires_at);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    fn apply(&mut self, command: Command, now: Instant) -> Result<Reply, StoreError> {
        let reply = match command {
            Command::HSet { key, fields } => {
                let map = self.hash_mut(&key, now)?;
                let mut added = 0;
                for (field, value) in fields {
                    if map.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Reply::Int(added)
            }
            Command::HGetAll { key } => match self.live(&key, now).map(|e| &e.value) {
                None => Reply::Hash(HashMap::new()),
                Some(Value::Hash(map)) => Reply::Hash(map.clone()),
                Some(_) => return Err(wrong_type(&key)),
            },
            Command::HGet { key, field } => match self.live(&key, now).map(|e| &e.value) {
                None => Reply::Text(None),
                Some(Value::Hash(map)) => Reply::Text(map.get(&field).cloned()),
                Some(_) => return Err(wrong_type(&key)),
            },
            Command::HIncrBy { key, field, delta } => {
                let map = self.hash_mut(&key, now)?;
                let current = match map.get(&field) {
                    None => 0,
                    Some(text) => text
                        .parse::<i64>()
                        .map_err(|_| StoreError::corrupt(&key, "hash value is not an integer"))?,
                };
                let next = current + delta;
                map.insert(field, next.to_string());
                Reply::Int(next)
            }
            Command::Get { key } => match self.live(&key, now).map(|e| &e.value) {
                None => Reply::Text(None),
                Some(Value::Text(text)) => Reply::Text(Some(text.clone())),
                Some(_) => return Err(wrong_type(&key)),
            },
            Command::Set { key, value } => {
                self.entries.insert(
                    key,
                    Entry {
                        value: Value::Text(value),
                        expires_at: None,
                    },
                );
                Reply::Ok
            }
            Command::IncrBy { key, delta } => Reply::Int(self.counter(&key, delta, now)?),
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    if self.live(&key, now).is_some() {
                        self.entries.remove(&key);
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            Command::Expire { key, ttl } => match self.live(&key, now) {
                Some(entry) => {
                    entry.expires_at = Some(now + ttl);
                    Reply::Bool(true)
                }
                None => Reply::Bool(false),
            },
            Command::SAdd { key, members } => {
                let set = self.set_mut(&key, now)?;
                let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
                Reply::Int(added as i64)
            }
            Command::SRem { key, members } => {
                let removed = match self.live(&key, now).map(|e| &mut e.value) {
                    None => 0,
                    Some(Value::Set(set)) => members.iter().filter(|m| set.remove(*m)).count(),
                    Some(_) => return Err(wrong_type(&key)),
                };
                let now_empty = matches!(
                    self.entries.get(&key).map(|e| &e.value),
                    Some(Value::Set(set)) if set.is_empty()
                );
                if now_empty {
                    self.entries.remove(&key);
                }
                Reply::Int(removed as i64)
            }
            Command::SMembers { key } => match self.live(&key, now).map(|e| &e.value) {
                None => Reply::List(Vec::new()),
                Some(Value::Set(set)) => Reply::List(set.iter().cloned().collect()),
                Some(_) => return Err(wrong_type(&key)),
            },
            Command::SIsMember { key, member } => match self.live(&key, now).map(|e| &e.value) {
                None => Reply::Bool(false),
                Some(Value::Set(set)) => Reply::Bool(set.contains(&member)),
                Some(_) => return Err(wrong_type(&key)),
            },
            Command::ZAdd { key, score, member } => {
                let zset = self.sorted_mut(&key, now)?;
                let added = zset.insert(member, score).is_none();
                Reply::Int(i64::from(added))
            }
            Command::ZRangeByScore { key, min, max } => {
                match self.live(&key, now).map(|e| &e.value) {
                    None => Reply::List(Vec::new()),
                    Some(Value::Sorted(zset)) => {
                        let mut hits: Vec<(&String, f64)> = zset
                            .iter()
                            .filter(|(_, score)| **score >= min && **score <= max)
                            .map(|(member, score)| (member, *score))
                            .collect();
                        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                        Reply::List(hits.into_iter().map(|(m, _)| m.clone()).collect())
                    }
                    Some(_) => return Err(wrong_type(&key)),
                }
            }
            Command::Ping => Reply::Ok,
        };
        Ok(reply)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait::async_trait]
impl KvBackend for MemoryBackend {
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>, StoreError> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        debug!(commands = batch.len(), "executing batch in memory");
        batch
            .into_iter()
            .map(|command| keyspace.apply(command, now))
            .collect()
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keyspace = self.keyspace.lock();
        keyspace.purge_expired(Instant::now());
        let mut keys: Vec<String> = keyspace
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[tokio::test]
    async fn test_hash_set_and_get() {
        let backend = MemoryBackend::new();
        let replies = backend
            .execute(vec![
                Command::HSet {
                    key: s("node:1"),
                    fields: vec![(s("os"), s("linux")), (s("cpuCores"), s("4"))],
                },
                Command::HGet {
                    key: s("node:1"),
                    field: s("os"),
                },
                Command::HGetAll { key: s("node:2") },
            ])
            .await
            .unwrap();

        assert_eq!(replies[0], Reply::Int(2));
        assert_eq!(replies[1], Reply::Text(Some(s("linux"))));
        assert_eq!(replies[2], Reply::Hash(HashMap::new()));
    }

    #[tokio::test]
    async fn test_counters() {
        let backend = MemoryBackend::new();
        let replies = backend
            .execute(vec![
                Command::IncrBy {
                    key: s("c"),
                    delta: 5,
                },
                Command::IncrBy {
                    key: s("c"),
                    delta: 7,
                },
                Command::HIncrBy {
                    key: s("h"),
                    field: s("20240101"),
                    delta: 3,
                },
                Command::Get { key: s("c") },
            ])
            .await
            .unwrap();

        assert_eq!(replies[1], Reply::Int(12));
        assert_eq!(replies[2], Reply::Int(3));
        assert_eq!(replies[3], Reply::Text(Some(s("12"))));
    }

    #[tokio::test]
    async fn test_sorted_range_is_ordered_and_inclusive() {
        let backend = MemoryBackend::new();
        let mut batch: Vec<Command> = [("b", 20.0), ("a", 10.0), ("c", 30.0), ("d", 5.0)]
            .into_iter()
            .map(|(member, score)| Command::ZAdd {
                key: s("idx"),
                score,
                member: s(member),
            })
            .collect();
        batch.push(Command::ZRangeByScore {
            key: s("idx"),
            min: 10.0,
            max: 30.0,
        });

        let replies = backend.execute(batch).await.unwrap();
        assert_eq!(
            replies.last().unwrap(),
            &Reply::List(vec![s("a"), s("b"), s("c")])
        );
    }

    #[tokio::test]
    async fn test_sets() {
        let backend = MemoryBackend::new();
        let replies = backend
            .execute(vec![
                Command::SAdd {
                    key: s("set"),
                    members: vec![s("x"), s("y"), s("x")],
                },
                Command::SIsMember {
                    key: s("set"),
                    member: s("y"),
                },
                Command::SRem {
                    key: s("set"),
                    members: vec![s("x"), s("y")],
                },
                Command::SMembers { key: s("set") },
            ])
            .await
            .unwrap();

        assert_eq!(replies[0], Reply::Int(2));
        assert_eq!(replies[1], Reply::Bool(true));
        assert_eq!(replies[2], Reply::Int(2));
        assert_eq!(replies[3], Reply::List(vec![]));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let backend = MemoryBackend::new();
        backend
            .execute(vec![Command::Set {
                key: s("k"),
                value: s("v"),
            }])
            .await
            .unwrap();

        let err = backend
            .execute(vec![Command::SMembers { key: s("k") }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongType { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire() {
        let backend = MemoryBackend::new();
        backend
            .execute(vec![
                Command::HSet {
                    key: s("nodeApp:n:a"),
                    fields: vec![(s("md5"), s("x"))],
                },
                Command::Expire {
                    key: s("nodeApp:n:a"),
                    ttl: Duration::from_secs(60),
                },
            ])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(backend.len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let replies = backend
            .execute(vec![Command::HGetAll {
                key: s("nodeApp:n:a"),
            }])
            .await
            .unwrap();
        assert_eq!(replies[0], Reply::Hash(HashMap::new()));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let backend = MemoryBackend::new();
        backend
            .execute(vec![
                Command::Set {
                    key: s("sn:node:b"),
                    value: s("1"),
                },
                Command::Set {
                    key: s("sn:node:a"),
                    value: s("2"),
                },
                Command::Set {
                    key: s("node:1"),
                    value: s("3"),
                },
            ])
            .await
            .unwrap();

        let keys = backend.scan_prefix("sn:node:").await.unwrap();
        assert_eq!(keys, vec![s("sn:node:a"), s("sn:node:b")]);
    }
}
