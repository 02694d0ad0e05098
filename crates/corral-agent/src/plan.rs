//! Reconcile planning.
//!
//! Compares the desired containers from the control plane with what the
//! runtime reports and decides what to do. Planning is pure: applying the
//! plan and planning again against the result yields nothing to do.
//!
//! ```text
//!   remote only ──────────────▶ Create
//!   local only  ──────────────▶ Destroy
//!   both, re_create ──────────▶ Recreate
//!   both, keep_running, down ─▶ Start
//!   both, !keep_running, up ──▶ Stop
//!   both, state or IPs differ ▶ Report
//! ```

use std::collections::{BTreeMap, BTreeSet};

use corral_core::Name;

use crate::runtime::LocalContainer;
use crate::types::RemoteContainer;

/// One step toward the desired state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    /// Create, mount, start and initialize a new container.
    Create(Name),
    /// Destroy a container the control plane no longer assigns here.
    Destroy(Name),
    /// Destroy and create again.
    Recreate(Name),
    /// Start a stopped container.
    Start(Name),
    /// Stop a running container.
    Stop(Name),
    /// Nothing to change locally, but the control plane is out of date.
    Report(Name),
}

impl Action {
    /// The container this action applies to.
    #[must_use]
    pub fn container(&self) -> &Name {
        match self {
            Self::Create(n)
            | Self::Destroy(n)
            | Self::Recreate(n)
            | Self::Start(n)
            | Self::Stop(n)
            | Self::Report(n) => n,
        }
    }
}

/// Plan the actions that converge `local` toward `remote`.
///
/// `reported_ips` holds the addresses last sent for each container; a
/// container whose addresses changed since then is reported. Containers in
/// `skip` (e.g. with init scripts still running) are left alone.
#[must_use]
pub fn plan(
    remote: &[RemoteContainer],
    local: &BTreeMap<Name, LocalContainer>,
    reported_ips: &BTreeMap<Name, Vec<String>>,
    skip: &BTreeSet<Name>,
) -> Vec<Action> {
    let desired: BTreeMap<&Name, &RemoteContainer> = remote.iter().map(|c| (&c.name, c)).collect();
    let mut actions = Vec::new();

    for (name, want) in &desired {
        if skip.contains(*name) {
            continue;
        }
        let Some(have) = local.get(*name) else {
            actions.push(Action::Create((*name).clone()));
            continue;
        };

        let name = (*name).clone();
        if want.re_create {
            actions.push(Action::Recreate(name));
        } else if want.keep_running && !have.state.is_running() {
            actions.push(Action::Start(name));
        } else if !want.keep_running && have.state.is_running() {
            actions.push(Action::Stop(name));
        } else if want.state != have.state
            || reported_ips.get(&name).map_or(!have.ips.is_empty(), |ips| *ips != have.ips)
        {
            actions.push(Action::Report(name));
        }
    }

    for name in local.keys() {
        if !desired.contains_key(name) && !skip.contains(name) {
            actions.push(Action::Destroy(name.clone()));
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::ContainerState;
    use serde_json::json;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn remote(value: serde_json::Value) -> RemoteContainer {
        serde_json::from_value(value).unwrap()
    }

    fn local(state: ContainerState, ips: &[&str]) -> LocalContainer {
        LocalContainer {
            state,
            ips: ips.iter().map(|s| (*s).to_string()).collect(),
            created: Some(1),
        }
    }

    #[test]
    fn adds_and_removes_by_name() {
        let desired = vec![remote(json!({"name": "new"})), remote(json!({"name": "both", "state": "RUNNING"}))];
        let actual = BTreeMap::from([
            (name("both"), local(ContainerState::Running, &[])),
            (name("old"), local(ContainerState::Running, &[])),
        ]);

        let actions = plan(&desired, &actual, &BTreeMap::new(), &BTreeSet::new());
        assert_eq!(
            actions,
            vec![Action::Create(name("new")), Action::Destroy(name("old"))]
        );
    }

    #[test]
    fn recreate_wins_over_run_state() {
        let desired = vec![remote(json!({"name": "c", "re_create": true, "keep_running": false}))];
        let actual = BTreeMap::from([(name("c"), local(ContainerState::Running, &[]))]);
        let actions = plan(&desired, &actual, &BTreeMap::new(), &BTreeSet::new());
        assert_eq!(actions, vec![Action::Recreate(name("c"))]);
    }

    #[test]
    fn reconciles_run_state() {
        let desired = vec![
            remote(json!({"name": "up", "state": "STOPPED"})),
            remote(json!({"name": "down", "keep_running": false, "state": "RUNNING"})),
        ];
        let actual = BTreeMap::from([
            (name("up"), local(ContainerState::Stopped, &[])),
            (name("down"), local(ContainerState::Running, &[])),
        ]);
        let mut actions = plan(&desired, &actual, &BTreeMap::new(), &BTreeSet::new());
        actions.sort();
        assert_eq!(
            actions,
            vec![Action::Start(name("up")), Action::Stop(name("down"))]
        );
    }

    #[test]
    fn reports_state_and_ip_drift() {
        let desired = vec![
            remote(json!({"name": "drift", "state": "UNKNOWN"})),
            remote(json!({"name": "moved", "state": "RUNNING"})),
        ];
        let actual = BTreeMap::from([
            (name("drift"), local(ContainerState::Running, &[])),
            (name("moved"), local(ContainerState::Running, &["10.0.3.9"])),
        ]);
        let reported = BTreeMap::from([(name("moved"), vec!["10.0.3.2".to_string()])]);

        let actions = plan(&desired, &actual, &reported, &BTreeSet::new());
        assert_eq!(
            actions,
            vec![Action::Report(name("drift")), Action::Report(name("moved"))]
        );
    }

    #[test]
    fn converged_state_plans_nothing() {
        let desired = vec![
            remote(json!({"name": "a", "state": "RUNNING"})),
            remote(json!({"name": "b", "state": "STOPPED", "keep_running": false})),
        ];
        let actual = BTreeMap::from([
            (name("a"), local(ContainerState::Running, &["10.0.3.2"])),
            (name("b"), local(ContainerState::Stopped, &[])),
        ]);
        let reported = BTreeMap::from([(name("a"), vec!["10.0.3.2".to_string()])]);

        assert!(plan(&desired, &actual, &reported, &BTreeSet::new()).is_empty());
        assert!(plan(&desired, &actual, &reported, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn skipped_containers_are_left_alone() {
        let desired = vec![remote(json!({"name": "busy", "re_create": true}))];
        let actual = BTreeMap::from([
            (name("busy"), local(ContainerState::Running, &[])),
            (name("leaving"), local(ContainerState::Running, &[])),
        ]);
        let skip = BTreeSet::from([name("busy"), name("leaving")]);
        assert!(plan(&desired, &actual, &BTreeMap::new(), &skip).is_empty());
    }
}
