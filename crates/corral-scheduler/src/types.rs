//! Types for the scheduler crate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use corral_core::Name;
use serde::{Deserialize, Serialize};

/// Configuration for the placement scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// A host is online if its last heartbeat is at most this many seconds old.
    pub online_window_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 180,
        }
    }
}

impl SchedulerConfig {
    /// The freshness window as a `Duration`.
    #[must_use]
    pub const fn online_window(&self) -> Duration {
        Duration::from_secs(self.online_window_secs)
    }

    /// Whether a host whose last heartbeat was `last` counts as online at `now`.
    #[must_use]
    pub fn is_online(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last else {
            return false;
        };
        let window = i64::try_from(self.online_window_secs).unwrap_or(i64::MAX);
        now.signed_duration_since(last).num_seconds() <= window
    }
}

/// A snapshot of one host's load, used for ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLoad {
    /// Host name.
    pub name: Name,
    /// Number of containers currently assigned.
    pub containers: u64,
    /// Total memory in bytes.
    pub mem_total: u64,
    /// Container cap, 0 for unlimited.
    pub max_containers: u64,
}

impl HostLoad {
    /// Whether the host can take one more container.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.max_containers == 0 || self.containers < self.max_containers
    }
}

/// The outcome of one scheduling invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A request was moved into the calling host's containers.
    Assigned {
        /// The request (now container) name.
        request: Name,
        /// The receiving host.
        host: Name,
    },
    /// The calling host is already at `max_containers`.
    HostAtCapacity,
    /// There is nothing queued.
    QueueEmpty,
    /// Another host ranks ahead of the caller.
    NotSelected {
        /// The top-ranked candidate, if any host qualified.
        winner: Option<Name>,
    },
}

impl Placement {
    /// Returns true if a request was assigned.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn online_window_is_inclusive() {
        let config = SchedulerConfig::default();
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        assert!(config.is_online(Some(Utc.timestamp_opt(10_000 - 180, 0).unwrap()), now));
        assert!(!config.is_online(Some(Utc.timestamp_opt(10_000 - 181, 0).unwrap()), now));
        assert!(!config.is_online(None, now));
    }

    #[test]
    fn unlimited_capacity() {
        let load = HostLoad {
            name: Name::parse("h").unwrap(),
            containers: 1_000,
            mem_total: 1,
            max_containers: 0,
        };
        assert!(load.has_capacity());
        let capped = HostLoad {
            max_containers: 1_000,
            ..load
        };
        assert!(!capped.has_capacity());
    }
}
