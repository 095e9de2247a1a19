//! Configuration types for strata
//!
//! Engine-level configuration shared by the target daemon and the
//! background workers. Everything has a usable default; the daemon
//! overlays TOML and CLI flags on top.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the target engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub lru: LruConf,
    #[serde(default)]
    pub disk: DiskConf,
    #[serde(default)]
    pub timeout: TimeoutConf,
    #[serde(default)]
    pub auth: AuthConf,
}

/// Which bucket class the LRU evictor drains first
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionOrder {
    /// Evict re-fetchable cloud objects before native ones (default)
    #[default]
    CloudFirst,
    /// Evict native-bucket objects first
    LocalFirst,
}

/// LRU eviction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LruConf {
    pub enabled: bool,
    /// Used-capacity percentage that triggers eviction
    pub high_wm: u8,
    /// Eviction runs until used capacity drops to this percentage
    pub low_wm: u8,
    /// Objects accessed within this window are never evicted
    #[serde(with = "secs")]
    pub dont_evict_time: Duration,
    /// How often the capacity monitor probes disk usage
    #[serde(with = "secs")]
    pub capacity_upd_time: Duration,
    pub eviction_order: EvictionOrder,
}

impl Default for LruConf {
    fn default() -> Self {
        Self {
            enabled: true,
            high_wm: 90,
            low_wm: 75,
            dont_evict_time: Duration::from_secs(2 * 3600),
            capacity_upd_time: Duration::from_secs(10 * 60),
            eviction_order: EvictionOrder::CloudFirst,
        }
    }
}

impl LruConf {
    pub fn validate(&self) -> Result<(), String> {
        if self.low_wm >= self.high_wm || self.high_wm > 100 {
            return Err(format!(
                "invalid LRU watermarks: low {} high {} (need low < high <= 100)",
                self.low_wm, self.high_wm
            ));
        }
        Ok(())
    }
}

/// Disk utilization thresholds for worker self-throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskConf {
    /// Below this utilization percentage workers run unthrottled
    pub disk_util_low_wm: u8,
    /// At or above this utilization workers sleep `throttle_max` per yield
    pub disk_util_high_wm: u8,
    /// Bytes examined between capacity/abort checks during a walk
    pub capacity_check_interval: u64,
}

impl Default for DiskConf {
    fn default() -> Self {
        Self {
            disk_util_low_wm: 60,
            disk_util_high_wm: 90,
            capacity_check_interval: 256 * 1024 * 1024,
        }
    }
}

/// Engine-wide timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConf {
    /// On-demand xactions idling longer than this are reaped
    #[serde(with = "secs")]
    pub xact_idle: Duration,
    /// Retention of finished/aborted registry entries
    #[serde(with = "secs")]
    pub xact_retention: Duration,
}

impl Default for TimeoutConf {
    fn default() -> Self {
        Self {
            xact_idle: Duration::from_secs(2 * 60),
            xact_retention: Duration::from_secs(time::HOUR),
        }
    }
}

/// Authorization configuration; the engine only verifies tokens
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConf {
    pub enabled: bool,
    #[serde(default)]
    pub secret: String,
}

mod time {
    pub const HOUR: u64 = 3600;
}

/// Durations are configured in whole seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
