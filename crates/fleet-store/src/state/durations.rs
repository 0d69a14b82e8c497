//! Online-duration counters.
//!
//! Each node has a lifetime counter and a per-day map keyed by `YYYYMMDD`.
//! Per-day values are clamped to one day's worth of seconds when read.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use fleet_core::time::{self, SECONDS_PER_DAY};
use fleet_core::NodeId;
use tracing::warn;

use super::StateStore;
use crate::backend::Command;
use crate::error::StoreError;

impl StateStore {
    /// Add `seconds` to the lifetime counter and to the counter of the day
    /// containing `now`, in one batch.
    pub async fn incr_online_duration(
        &self,
        id: &NodeId,
        seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if seconds <= 0 {
            return Err(StoreError::InvalidArgument(format!(
                "online duration must be positive, got {}",
                seconds
            )));
        }
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("node id is empty".into()));
        }

        self.run(
            "incr_online_duration",
            vec![
                Command::IncrBy {
                    key: self.keys.online_duration(id),
                    delta: seconds,
                },
                Command::HIncrBy {
                    key: self.keys.online_duration_stats(id),
                    field: time::day_stamp(now),
                    delta: seconds,
                },
            ],
        )
        .await?;
        Ok(())
    }

    /// Lifetime online seconds, 0 when never accrued.
    pub async fn online_duration(&self, id: &NodeId) -> Result<i64, StoreError> {
        let key = self.keys.online_duration(id);
        let raw = self
            .run_one("online_duration", Command::Get { key: key.clone() })
            .await?
            .into_text()?;
        match raw {
            None => Ok(0),
            Some(text) => text
                .trim()
                .parse()
                .map_err(|_| StoreError::corrupt(key, format!("{:?}", text))),
        }
    }

    /// Lifetime online seconds of many nodes in one round trip.
    ///
    /// Missing counters read as 0; unparsable ones are logged and read as 0.
    pub async fn online_duration_map(&self, ids: &[NodeId]) -> Result<HashMap<NodeId, i64>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let batch = ids
            .iter()
            .map(|id| Command::Get {
                key: self.keys.online_duration(id),
            })
            .collect();
        let replies = self.run("online_duration_map", batch).await?;

        let mut durations = HashMap::with_capacity(ids.len());
        for (id, reply) in ids.iter().zip(replies) {
            let seconds = match reply.into_text()? {
                None => 0,
                Some(text) => text.trim().parse().unwrap_or_else(|_| {
                    warn!("online_duration_map: bad counter for {}: {:?}", id, text);
                    0
                }),
            };
            durations.insert(id.clone(), seconds);
        }
        Ok(durations)
    }

    /// Per-day online seconds, each clamped to one day.
    ///
    /// Entries with a malformed day or value are logged and skipped.
    pub async fn online_duration_stats(&self, id: &NodeId) -> Result<BTreeMap<String, i64>, StoreError> {
        let map = self
            .run_one(
                "online_duration_stats",
                Command::HGetAll {
                    key: self.keys.online_duration_stats(id),
                },
            )
            .await?
            .into_hash()?;

        let mut stats = BTreeMap::new();
        for (day, raw) in map {
            if time::parse_day_stamp(&day).is_none() {
                warn!("online_duration_stats: bad day {:?} for {}", day, id);
                continue;
            }
            match raw.trim().parse::<i64>() {
                Ok(seconds) => {
                    stats.insert(day, seconds.clamp(0, SECONDS_PER_DAY));
                }
                Err(_) => warn!("online_duration_stats: bad value {:?} for {} on {}", raw, id, day),
            }
        }
        Ok(stats)
    }

    /// Online seconds on one day as stored, `"0"` when absent.
    pub async fn online_duration_on(&self, id: &NodeId, day: &str) -> Result<String, StoreError> {
        let raw = self
            .run_one(
                "online_duration_on",
                Command::HGet {
                    key: self.keys.online_duration_stats(id),
                    field: day.to_string(),
                },
            )
            .await?
            .into_text()?;
        Ok(raw.unwrap_or_else(|| "0".to_string()))
    }
}
