use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::haunt::Haunter;

/// User-configurable eviction policy, convertible into a [`Haunter`].
///
/// Meant to be embedded in a service's own configuration file:
///
/// ```
/// # fn main() -> anyhow::Result<()> {
/// let config: streamcache::EvictionConfig = serde_json::from_str(
///     r#"{ "max_unused_for": "1h", "max_items": 1000, "period": "5m" }"#,
/// )?;
/// assert!(config.haunter().is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Evict streams whose last read is older than this. `None` keeps
    /// streams forever.
    #[serde(with = "humantime_serde")]
    pub max_unused_for: Option<Duration>,

    /// Maximum number of retained streams. Zero disables the bound.
    pub max_items: usize,

    /// Maximum cumulative stream size in bytes. Zero disables the bound.
    pub max_size: u64,

    /// Interval between eviction passes.
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig {
            max_unused_for: None,
            max_items: 0,
            max_size: 0,
            period: Duration::from_secs(3600),
        }
    }
}

impl EvictionConfig {
    /// Builds the eviction schedule this configuration describes, or `None`
    /// if every bound is disabled.
    pub fn haunter(&self) -> Option<Haunter> {
        let mut parts = Vec::new();
        if let Some(expiry) = self.max_unused_for {
            parts.push(Haunter::reaper(expiry, self.period));
        }
        if self.max_items > 0 || self.max_size > 0 {
            parts.push(Haunter::janitor(self.max_items, self.max_size, self.period));
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Haunter::compound(parts)),
        }
    }
}
