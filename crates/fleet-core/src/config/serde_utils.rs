//! Serde helpers for configuration values

/// `Duration` as a number of seconds.
///
/// Whole durations are written as integers. Fractional values such as
/// `timeout = 0.5` are accepted for the short store and geo-ip timeouts.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Intervals {
///     #[serde(with = "fleet_core::config::serde_utils::duration_secs")]
///     backoff: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}
