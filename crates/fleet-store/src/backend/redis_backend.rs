//! Redis backend.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::{FromRedisValue, Value};
use tracing::{debug, info};

use super::{Command, KvBackend, Reply};
use crate::error::StoreError;

const SCAN_BATCH: usize = 500;

/// Backend talking to a redis server through a reconnecting connection.
///
/// Batches are sent as a plain pipeline, not wrapped in `MULTI`.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

/// How to read the reply of each command in a pipeline.
enum Expect {
    Ok,
    Int,
    Bool,
    Text,
    Hash,
    List,
}

impl RedisBackend {
    /// Connect to the server at `url`, for example `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }

    fn encode(pipe: &mut redis::Pipeline, command: Command) -> Expect {
        match command {
            Command::HSet { key, fields } => {
                let cmd = pipe.cmd("HSET").arg(key);
                for (field, value) in fields {
                    cmd.arg(field).arg(value);
                }
                Expect::Int
            }
            Command::HGetAll { key } => {
                pipe.cmd("HGETALL").arg(key);
                Expect::Hash
            }
            Command::HGet { key, field } => {
                pipe.cmd("HGET").arg(key).arg(field);
                Expect::Text
            }
            Command::HIncrBy { key, field, delta } => {
                pipe.cmd("HINCRBY").arg(key).arg(field).arg(delta);
                Expect::Int
            }
            Command::Get { key } => {
                pipe.cmd("GET").arg(key);
                Expect::Text
            }
            Command::Set { key, value } => {
                pipe.cmd("SET").arg(key).arg(value);
                Expect::Ok
            }
            Command::IncrBy { key, delta } => {
                pipe.cmd("INCRBY").arg(key).arg(delta);
                Expect::Int
            }
            Command::Del { keys } => {
                pipe.cmd("DEL").arg(keys);
                Expect::Int
            }
            Command::Expire { key, ttl } => {
                pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs());
                Expect::Bool
            }
            Command::SAdd { key, members } => {
                pipe.cmd("SADD").arg(key).arg(members);
                Expect::Int
            }
            Command::SRem { key, members } => {
                pipe.cmd("SREM").arg(key).arg(members);
                Expect::Int
            }
            Command::SMembers { key } => {
                pipe.cmd("SMEMBERS").arg(key);
                Expect::List
            }
            Command::SIsMember { key, member } => {
                pipe.cmd("SISMEMBER").arg(key).arg(member);
                Expect::Bool
            }
            Command::ZAdd { key, score, member } => {
                pipe.cmd("ZADD").arg(key).arg(score).arg(member);
                Expect::Int
            }
            Command::ZRangeByScore { key, min, max } => {
                pipe.cmd("ZRANGEBYSCORE").arg(key).arg(min).arg(max);
                Expect::List
            }
            Command::Ping => {
                pipe.cmd("PING");
                Expect::Ok
            }
        }
    }

    fn decode(expect: &Expect, value: &Value) -> Result<Reply, StoreError> {
        let reply = match expect {
            Expect::Ok => Reply::Ok,
            Expect::Int => Reply::Int(i64::from_redis_value(value)?),
            Expect::Bool => Reply::Bool(bool::from_redis_value(value)?),
            Expect::Text => Reply::Text(Option::<String>::from_redis_value(value)?),
            Expect::Hash => Reply::Hash(HashMap::<String, String>::from_redis_value(value)?),
            Expect::List => Reply::List(Vec::<String>::from_redis_value(value)?),
        };
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl KvBackend for RedisBackend {
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>, StoreError> {
        let mut pipe = redis::pipe();
        let expects: Vec<Expect> = batch
            .into_iter()
            .map(|command| Self::encode(&mut pipe, command))
            .collect();

        let mut conn = self.conn.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        debug!(commands = expects.len(), "executed redis pipeline");

        if values.len() != expects.len() {
            return Err(StoreError::Unavailable(format!(
                "pipeline returned {} replies for {} commands",
                values.len(),
                expects.len()
            )));
        }

        expects
            .iter()
            .zip(values.iter())
            .map(|(expect, value)| Self::decode(expect, value))
            .collect()
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
