//! Scheduled eviction.
//!
//! A [`Haunter`] decides which streams to drop and how long to wait between
//! passes. The cache runs it on a dedicated thread, re-arming a one-shot
//! timeout from [`next`](Haunter::next) after every pass, so a policy can vary
//! its own cadence. Policies only ever report keys; the cache performs the
//! removal, which drains in-flight handles first.
//!
//! Two strategies ship with the crate: the [`Reaper`] drops streams not read
//! for a configured expiry, the [`Janitor`] enforces count and size quotas by
//! evicting the least recently read streams first. [`Haunter::compound`]
//! chains several strategies into one schedule.

use std::time::Duration;

use crate::cache::EvictionScan;

mod janitor;
mod reaper;

pub use janitor::Janitor;
pub use reaper::Reaper;

/// An eviction schedule: one or more strategies plus their cadence.
#[derive(Debug, Clone)]
pub enum Haunter {
    Reaper(Reaper),
    Janitor(Janitor),
    Compound(Vec<Haunter>),
}

impl Haunter {
    /// Age-based eviction: drop streams whose last read is older than
    /// `expiry`, checked every `period`.
    pub fn reaper(expiry: Duration, period: Duration) -> Haunter {
        Haunter::Reaper(Reaper::new(expiry, period))
    }

    /// Quota-based eviction: keep at most `max_items` streams and `max_size`
    /// cumulative bytes, checked every `period`. A zero bound is ignored.
    pub fn janitor(max_items: usize, max_size: u64, period: Duration) -> Haunter {
        Haunter::Janitor(Janitor::new(max_items, max_size, period))
    }

    /// Runs every child in order on each pass; the schedule ticks at the
    /// earliest child's cadence.
    pub fn compound(children: Vec<Haunter>) -> Haunter {
        Haunter::Compound(children)
    }

    /// One eviction pass over the cache.
    pub(crate) fn haunt(&self, scan: &EvictionScan<'_>) {
        match self {
            Haunter::Reaper(reaper) => {
                for key in reaper.scrub(scan) {
                    scan.evict(&key);
                }
            }
            Haunter::Janitor(janitor) => {
                for key in janitor.scrub(scan) {
                    scan.evict(&key);
                }
            }
            Haunter::Compound(children) => {
                for child in children {
                    child.haunt(scan);
                }
            }
        }
    }

    /// Delay until the next pass.
    pub(crate) fn next(&self) -> Duration {
        match self {
            Haunter::Reaper(reaper) => reaper.period(),
            Haunter::Janitor(janitor) => janitor.period(),
            Haunter::Compound(children) => children
                .iter()
                .map(Haunter::next)
                .min()
                .unwrap_or(Duration::MAX),
        }
    }
}
