//! Deterministic ordering of candidate hosts and queued requests.
//!
//! Hosts rank by ascending container count, then descending memory, then
//! name. Requests are served oldest first, by `date_requested` and then name.

use std::cmp::Ordering;

use corral_store::ContainerRequest;

use crate::types::HostLoad;

/// Compare two hosts by placement preference; `Less` means `a` is preferred.
#[must_use]
pub fn compare_hosts(a: &HostLoad, b: &HostLoad) -> Ordering {
    a.containers
        .cmp(&b.containers)
        .then_with(|| b.mem_total.cmp(&a.mem_total))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort candidates best-first.
pub fn rank(candidates: &mut [HostLoad]) {
    candidates.sort_by(compare_hosts);
}

/// The most preferred candidate, if any.
#[must_use]
pub fn winner(candidates: &[HostLoad]) -> Option<&HostLoad> {
    candidates.iter().min_by(|a, b| compare_hosts(a, b))
}

/// Sort requests oldest first. Requests without a date sort last.
pub fn queue_order(requests: &mut [ContainerRequest]) {
    requests.sort_by(|a, b| {
        let key = |r: &ContainerRequest| r.date_requested.unwrap_or(i64::MAX);
        key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
    });
}
