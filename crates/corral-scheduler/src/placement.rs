//! Heartbeat-driven placement.
//!
//! Every authenticated heartbeat runs [`Scheduler::on_heartbeat`] for the
//! calling host. Each invocation independently ranks all live hosts with
//! spare capacity; only the top-ranked host takes the oldest queued request.
//! Hosts racing on the same heartbeat window agree on the winner because the
//! ranking is deterministic, and the store's locked move makes sure a
//! request lands on at most one host even if two winners disagree.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corral_core::Name;
use corral_store::{layout, ContainerRequest, Host, Store, StoreError};

use crate::error::{Result, SchedulerError};
use crate::ranking;
use crate::types::{HostLoad, Placement, SchedulerConfig};

/// Trait for assigning queued requests to hosts.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run one placement decision on behalf of `host`, whose heartbeat has
    /// just been recorded.
    ///
    /// Makes no changes unless it returns `Placement::Assigned`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the move fails for a
    /// reason other than losing a race.
    async fn on_heartbeat(&self, host: &Name, now: DateTime<Utc>) -> Result<Placement>;
}

/// Store-backed scheduler implementing the ranking heuristic.
pub struct PlacementScheduler<S: Store> {
    store: Arc<S>,
    config: SchedulerConfig,
}

impl<S: Store> PlacementScheduler<S> {
    /// Create a scheduler over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Get the scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Synchronous placement decision. Blocks on record locks.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::on_heartbeat`].
    pub fn place(&self, host: &Name, now: DateTime<Utc>) -> Result<Placement> {
        let caller = self.load(host)?;
        if !caller.has_capacity() {
            tracing::debug!(host = %host, max = caller.max_containers, "Host at capacity");
            return Ok(Placement::HostAtCapacity);
        }

        let queue = self.queue()?;
        if queue.is_empty() {
            return Ok(Placement::QueueEmpty);
        }

        let candidates = self.candidates(now)?;
        let winner = ranking::winner(&candidates).map(|w| w.name.clone());
        if winner.as_ref() != Some(host) {
            tracing::debug!(host = %host, winner = ?winner, "Host not selected");
            return Ok(Placement::NotSelected { winner });
        }

        let destination = layout::containers(host);
        for request in queue {
            match self
                .store
                .move_record(&layout::container_requests(), &destination, &request.name)
            {
                Ok(()) => {
                    tracing::info!(
                        request = %request.name,
                        host = %host,
                        requested_by = %request.requested_by,
                        "Assigned container request"
                    );
                    return Ok(Placement::Assigned {
                        request: request.name,
                        host: host.clone(),
                    });
                }
                // Taken by a concurrent heartbeat, or the name is already
                // used on this host. Try the next one.
                Err(StoreError::NotFound { .. } | StoreError::Conflict { .. }) => {
                    tracing::debug!(request = %request.name, "Request unavailable, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Placement::QueueEmpty)
    }

    fn load(&self, name: &Name) -> Result<HostLoad> {
        let host: Host = self.store.get(&layout::hosts(), name)?;
        let containers = self.store.list(&layout::containers(name), None)?.count();
        Ok(HostLoad {
            name: host.name,
            containers: containers as u64,
            mem_total: host.mem_total,
            max_containers: host.max_containers,
        })
    }

    fn queue(&self) -> Result<Vec<ContainerRequest>> {
        let collection = layout::container_requests();
        let mut requests = Vec::new();
        for name in self.store.list(&collection, None)? {
            match self.store.get(&collection, &name) {
                Ok(request) => requests.push(request),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        ranking::queue_order(&mut requests);
        Ok(requests)
    }

    fn candidates(&self, now: DateTime<Utc>) -> Result<Vec<HostLoad>> {
        let mut candidates = Vec::new();
        for name in self.store.list(&layout::hosts(), None)? {
            let last = match self.store.last_heartbeat(&name) {
                Ok(last) => last,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if !self.config.is_online(last, now) {
                continue;
            }
            match self.load(&name) {
                Ok(load) if load.has_capacity() => candidates.push(load),
                Ok(_) => {}
                Err(SchedulerError::Store(e)) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(candidates)
    }
}

#[async_trait]
impl<S: Store + 'static> Scheduler for PlacementScheduler<S> {
    async fn on_heartbeat(&self, host: &Name, now: DateTime<Utc>) -> Result<Placement> {
        let this = Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        };
        let host = host.clone();
        tokio::task::spawn_blocking(move || this.place(&host, now))
            .await
            .map_err(|e| SchedulerError::Task(e.to_string()))?
    }
}

/// Mock scheduler for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, DateTime, Name, Placement, Result, Scheduler, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A mock scheduler that records heartbeats and replays canned outcomes.
    #[derive(Default)]
    pub struct MockScheduler {
        heartbeats: Mutex<Vec<Name>>,
        outcomes: Mutex<VecDeque<Placement>>,
    }

    impl MockScheduler {
        /// Create a new mock that always reports an empty queue.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an outcome for the next invocation.
        pub fn push_outcome(&self, placement: Placement) {
            self.outcomes.lock().push_back(placement);
        }

        /// Hosts that triggered the scheduler, in order.
        #[must_use]
        pub fn heartbeats(&self) -> Vec<Name> {
            self.heartbeats.lock().clone()
        }
    }

    #[async_trait]
    impl Scheduler for MockScheduler {
        async fn on_heartbeat(&self, host: &Name, _now: DateTime<Utc>) -> Result<Placement> {
            self.heartbeats.lock().push(host.clone());
            Ok(self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or(Placement::QueueEmpty))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use corral_store::{FsStore, Props};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        store: Arc<FsStore>,
        scheduler: PlacementScheduler<FsStore>,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(FsStore::open(dir.path()).unwrap());
            let scheduler = PlacementScheduler::new(Arc::clone(&store), SchedulerConfig::default());
            Self {
                store,
                scheduler,
                _dir: dir,
            }
        }

        fn host(&self, host: &str, mem_total: u64, max_containers: u64) {
            self.store
                .create(
                    &layout::hosts(),
                    &name(host),
                    props(json!({
                        "distro_id": "ubuntu", "distro_release": "14.04",
                        "distro_codename": "trusty", "mem_total": mem_total,
                        "cpu_total": 2, "cpu_type": "x86_64",
                        "max_containers": max_containers, "api_key": "k"
                    })),
                )
                .unwrap();
        }

        fn ping(&self, host: &str) {
            self.store.record_heartbeat(&name(host), now()).unwrap();
        }

        fn container(&self, host: &str, container: &str) {
            self.store
                .create(&layout::containers(&name(host)), &name(container), Props::new())
                .unwrap();
        }

        fn request(&self, request: &str, date: i64) {
            self.store
                .create(
                    &layout::container_requests(),
                    &name(request),
                    props(json!({
                        "template": "ubuntu", "release": "xenial",
                        "date_requested": date, "requested_by": "alice"
                    })),
                )
                .unwrap();
        }

        fn queued(&self) -> usize {
            self.store
                .list(&layout::container_requests(), None)
                .unwrap()
                .count()
        }

        fn count(&self, host: &str) -> usize {
            self.store
                .list(&layout::containers(&name(host)), None)
                .unwrap()
                .count()
        }
    }

    #[test]
    fn offline_host_never_receives() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.request("container_foo", 1);

        let placement = fx.scheduler.place(&name("host1"), now()).unwrap();
        assert_eq!(placement, Placement::NotSelected { winner: None });
        assert_eq!(fx.queued(), 1);
        assert_eq!(fx.count("host1"), 0);
    }

    #[test]
    fn stale_heartbeat_is_offline() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        fx.request("container_foo", 1);

        let later = now() + Duration::seconds(181);
        let placement = fx.scheduler.place(&name("host1"), later).unwrap();
        assert!(!placement.is_assigned());
        assert_eq!(fx.queued(), 1);
    }

    #[test]
    fn unenlisted_online_host_is_a_candidate() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        let host: Host = fx.store.get(&layout::hosts(), &name("host1")).unwrap();
        assert!(!host.enlisted);
        fx.ping("host1");
        fx.request("container_foo", 1);

        let placement = fx.scheduler.place(&name("host1"), now()).unwrap();
        assert!(placement.is_assigned());
        assert_eq!(fx.count("host1"), 1);
    }

    #[test]
    fn single_online_host_takes_request() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        fx.request("container_foo", 1);

        let placement = fx.scheduler.place(&name("host1"), now()).unwrap();
        assert_eq!(
            placement,
            Placement::Assigned {
                request: name("container_foo"),
                host: name("host1"),
            }
        );
        assert_eq!(fx.queued(), 0);
        let names: Vec<_> = fx
            .store
            .list(&layout::containers(&name("host1")), None)
            .unwrap()
            .collect();
        assert_eq!(names, vec![name("container_foo")]);
    }

    #[test]
    fn empty_queue_is_a_noop() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        assert_eq!(
            fx.scheduler.place(&name("host1"), now()).unwrap(),
            Placement::QueueEmpty
        );
    }

    #[test]
    fn host_at_max_containers_never_receives() {
        let fx = Fixture::new();
        fx.host("host1", 5, 1);
        fx.ping("host1");

        fx.request("first", 1);
        assert!(fx.scheduler.place(&name("host1"), now()).unwrap().is_assigned());
        assert_eq!(fx.count("host1"), 1);

        fx.request("second", 2);
        assert_eq!(
            fx.scheduler.place(&name("host1"), now()).unwrap(),
            Placement::HostAtCapacity
        );
        assert_eq!(fx.queued(), 1);
        assert_eq!(fx.count("host1"), 1);
    }

    #[test]
    fn equal_count_prefers_more_memory() {
        let fx = Fixture::new();
        fx.host("host1", 6, 1);
        fx.host("host2", 5, 1);
        fx.ping("host1");
        fx.ping("host2");
        fx.request("container_foo", 1);

        // host2 heartbeats first but is outranked.
        assert_eq!(
            fx.scheduler.place(&name("host2"), now()).unwrap(),
            Placement::NotSelected {
                winner: Some(name("host1"))
            }
        );
        assert_eq!(fx.queued(), 1);

        assert!(fx.scheduler.place(&name("host1"), now()).unwrap().is_assigned());
        assert_eq!(fx.count("host1"), 1);
        assert_eq!(fx.count("host2"), 0);

        // host1 is now full, so the next request goes to host2.
        fx.request("container_bar", 2);
        assert!(fx.scheduler.place(&name("host2"), now()).unwrap().is_assigned());
        assert_eq!(fx.count("host2"), 1);
    }

    #[test]
    fn lower_count_wins_regardless_of_memory() {
        let fx = Fixture::new();
        fx.host("h1", 6, 0);
        fx.host("h2", 5, 0);
        fx.container("h1", "a");
        fx.container("h1", "b");
        fx.container("h2", "c");
        fx.ping("h1");
        fx.ping("h2");
        fx.request("job", 1);

        assert!(!fx.scheduler.place(&name("h1"), now()).unwrap().is_assigned());
        assert!(fx.scheduler.place(&name("h2"), now()).unwrap().is_assigned());
        assert_eq!(fx.count("h2"), 2);
    }

    #[test]
    fn oldest_request_is_served_first() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        fx.request("newer", 20);
        fx.request("older", 10);

        let placement = fx.scheduler.place(&name("host1"), now()).unwrap();
        assert_eq!(
            placement,
            Placement::Assigned {
                request: name("older"),
                host: name("host1"),
            }
        );
    }

    #[test]
    fn name_clash_on_host_skips_to_next_request() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.container("host1", "dup");
        fx.ping("host1");
        fx.request("dup", 1);
        fx.request("fresh", 2);

        let placement = fx.scheduler.place(&name("host1"), now()).unwrap();
        assert_eq!(
            placement,
            Placement::Assigned {
                request: name("fresh"),
                host: name("host1"),
            }
        );
        assert_eq!(fx.queued(), 1);
    }

    #[test]
    fn concurrent_winners_place_at_most_once() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        fx.request("only", 1);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| fx.scheduler.place(&name("host1"), now()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|p| p.is_assigned()).count(), 1);
        assert_eq!(fx.count("host1"), 1);
        assert_eq!(fx.queued(), 0);
    }

    #[tokio::test]
    async fn async_entry_point_assigns() {
        let fx = Fixture::new();
        fx.host("host1", 5, 0);
        fx.ping("host1");
        fx.request("job", 1);

        let placement = fx.scheduler.on_heartbeat(&name("host1"), now()).await.unwrap();
        assert!(placement.is_assigned());
    }

    #[tokio::test]
    async fn mock_scheduler_records_heartbeats() {
        let mock = mock::MockScheduler::new();
        mock.push_outcome(Placement::HostAtCapacity);

        let first = mock.on_heartbeat(&name("h"), now()).await.unwrap();
        let second = mock.on_heartbeat(&name("h"), now()).await.unwrap();
        assert_eq!(first, Placement::HostAtCapacity);
        assert_eq!(second, Placement::QueueEmpty);
        assert_eq!(mock.heartbeats(), vec![name("h"), name("h")]);
    }
}
