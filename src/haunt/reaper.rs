use std::time::{Duration, SystemTime};

use crate::cache::EvictionScan;

/// Age-based eviction.
///
/// A stream is reaped when nobody holds a handle on it and its last read is
/// older than `expiry`. A live writer counts as a holder, so a stream cannot
/// expire while it is still being produced.
#[derive(Debug, Clone)]
pub struct Reaper {
    expiry: Duration,
    period: Duration,
}

impl Reaper {
    pub(crate) fn new(expiry: Duration, period: Duration) -> Reaper {
        Reaper { expiry, period }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn scrub(&self, scan: &EvictionScan<'_>) -> Vec<String> {
        let now = SystemTime::now();
        let Some(cutoff) = now.checked_sub(self.expiry) else {
            return Vec::new();
        };

        let mut victims = Vec::new();
        for (key, entry) in scan.streams() {
            if entry.in_use() {
                continue;
            }
            // A stream the backend cannot stat is skipped, not reaped.
            let Ok(times) = scan.access_times(entry.name()) else {
                continue;
            };
            if times.last_read < cutoff {
                victims.push(key);
            }
        }
        victims
    }
}
