use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::EvictionScan;

/// Count/size quota eviction with least-recently-read victim selection.
///
/// Each pass collects every stream that is not in use, sorts them by last
/// read (oldest first), and evicts from the head until both quotas hold. A
/// zero quota disables that bound. Bookkeeping is best-effort: streams that
/// appear or grow during the pass are picked up on the next one.
#[derive(Debug, Clone)]
pub struct Janitor {
    max_items: usize,
    max_size: u64,
    period: Duration,
}

struct Candidate {
    key: String,
    size: u64,
    last_read: SystemTime,
}

impl Janitor {
    pub(crate) fn new(max_items: usize, max_size: u64, period: Duration) -> Janitor {
        Janitor {
            max_items,
            max_size,
            period,
        }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn scrub(&self, scan: &EvictionScan<'_>) -> Vec<String> {
        let mut candidates = Vec::new();
        let mut count = 0usize;
        let mut total = 0u64;

        for (key, entry) in scan.streams() {
            if entry.in_use() {
                continue;
            }
            let Ok(size) = scan.size(entry.name()) else {
                continue;
            };
            let last_read = scan
                .access_times(entry.name())
                .map(|times| times.last_read)
                .unwrap_or(UNIX_EPOCH);
            count += 1;
            total += size;
            candidates.push(Candidate {
                key,
                size,
                last_read,
            });
        }

        candidates.sort_by_key(|candidate| candidate.last_read);

        let mut victims = Vec::new();
        let mut head = candidates.into_iter();
        if self.max_items > 0 {
            while count > self.max_items {
                let Some(candidate) = head.next() else {
                    break;
                };
                count -= 1;
                total -= candidate.size;
                victims.push(candidate.key);
            }
        }
        if self.max_size > 0 {
            while total > self.max_size {
                let Some(candidate) = head.next() else {
                    break;
                };
                total -= candidate.size;
                victims.push(candidate.key);
            }
        }
        victims
    }
}
