//! Worker self-throttling
//!
//! Joggers sleep proportionally to measured disk utilization so
//! background eviction does not starve live I/O.

use std::time::Duration;
use strata_common::config::DiskConf;

pub(crate) const THROTTLE_MIN: Duration = Duration::from_millis(1);
pub(crate) const THROTTLE_MAX: Duration = Duration::from_secs(1);

/// Sleep to take between yield points for the given utilization.
pub(crate) fn throttle_delay(disk_util: u8, conf: &DiskConf) -> Option<Duration> {
    if disk_util < conf.disk_util_low_wm {
        return None;
    }
    if disk_util >= conf.disk_util_high_wm {
        return Some(THROTTLE_MAX);
    }
    let span = (conf.disk_util_high_wm - conf.disk_util_low_wm).max(1) as u32;
    let over = (disk_util - conf.disk_util_low_wm) as u32;
    let range = (THROTTLE_MAX - THROTTLE_MIN).as_millis() as u32;
    Some(THROTTLE_MIN + Duration::from_millis(u64::from(range * over / span)))
}
