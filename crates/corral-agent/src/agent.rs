//! The reconcile cycle.
//!
//! Each cycle fetches this host's desired containers (which also heartbeats
//! and triggers placement), pushes changed facts, converges the local
//! runtime, reports what changed and relays logs.
//!
//! An unreachable control API aborts the cycle. A runtime failure, or a
//! report the API rejects, only skips that container until the next
//! cycle. A failed self-update leaves the running version in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use corral_core::Name;

use crate::client::ControlApi;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::init::{InitOutcome, InitTasks};
use crate::logs::{LogRelay, CONSOLE_LOG};
use crate::plan::{plan, Action};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};
use crate::state::AgentState;
use crate::types::{ContainerReport, HostFacts, RemoteContainer};
use crate::updater;

/// Source of host facts.
pub type FactsSource = Arc<dyn Fn() -> HostFacts + Send + Sync>;

/// What a cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Containers created, including recreations.
    pub created: usize,
    /// Containers destroyed, including recreations and finished one-shots.
    pub destroyed: usize,
    /// Containers started or stopped.
    pub toggled: usize,
    /// Container reports sent.
    pub reported: usize,
    /// Containers whose lifecycle operation failed.
    pub failed: usize,
}

impl CycleReport {
    /// Returns true if nothing was done.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The host converged as far as it could.
    Converged(CycleReport),
    /// A new agent binary was installed and the process should restart.
    Restart,
}

/// The host agent.
pub struct Agent {
    api: Arc<dyn ControlApi>,
    runtime: Arc<dyn ContainerRuntime>,
    config: AgentConfig,
    config_path: PathBuf,
    executable: PathBuf,
    facts: FactsSource,
    state: AgentState,
    logs: Arc<LogRelay>,
    init: InitTasks,
    // One-shots whose init finished but whose destroy was not yet accepted.
    finished_one_shots: BTreeSet<Name>,
}

impl Agent {
    /// Create an agent. State is loaded from `config.state_dir`.
    #[must_use]
    pub fn new(
        api: Arc<dyn ControlApi>,
        runtime: Arc<dyn ContainerRuntime>,
        config: AgentConfig,
        config_path: PathBuf,
    ) -> Self {
        let state = AgentState::load(&config.state_dir);
        let logs = Arc::new(LogRelay::new(
            config.log_flush_bytes,
            config.log_flush_interval(),
        ));
        Self {
            api,
            runtime,
            config,
            config_path,
            executable: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("corral-agent")),
            facts: Arc::new(crate::facts::collect),
            state,
            logs,
            init: InitTasks::new(),
            finished_one_shots: BTreeSet::new(),
        }
    }

    /// Use `facts` instead of inspecting this machine.
    #[must_use]
    pub fn with_facts(mut self, facts: FactsSource) -> Self {
        self.facts = facts;
        self
    }

    /// Install self-updates at `executable` instead of the running binary.
    #[must_use]
    pub fn with_executable(mut self, executable: PathBuf) -> Self {
        self.executable = executable;
        self
    }

    /// The agent configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Cached state.
    #[must_use]
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Run one reconcile cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the control API cannot be reached, the runtime
    /// cannot list containers or state cannot be saved. Nothing is retried
    /// within the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let host = self.api.fetch_host().await?;

        if let Some(version) = host.client_version.as_deref() {
            if version != self.config.version {
                match updater::self_update(
                    self.api.as_ref(),
                    &self.executable,
                    &mut self.config,
                    &self.config_path,
                    version,
                )
                .await
                {
                    Ok(()) => return Ok(CycleOutcome::Restart),
                    Err(e) => tracing::warn!(
                        running = %self.config.version,
                        wanted = %version,
                        error = %e,
                        "Agent upgrade failed, staying on the running version"
                    ),
                }
            }
        }

        self.push_facts().await?;

        let mut report = CycleReport::default();
        let finished = self.init.reap().await;
        let reaped = self.finish_init(finished, &mut report).await?;

        // The host listing predates the destroy requests just sent.
        let mut local = self.runtime.list().await?;
        let desired: BTreeMap<Name, RemoteContainer> = host
            .containers
            .into_iter()
            .filter(|c| !reaped.contains(&c.name))
            .map(|c| (c.name.clone(), c))
            .collect();
        let remote: Vec<RemoteContainer> = desired.values().cloned().collect();
        let busy = self.init.running();

        let actions = plan(&remote, &local, &self.state.ips, &busy);
        let mut to_report = BTreeSet::new();
        for action in actions {
            let name = action.container().clone();
            match self.apply(&action, desired.get(&name), &mut report).await {
                Ok(true) => {
                    to_report.insert(name);
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(container = %name, action = ?action, error = %e, "Container action failed");
                }
            }
        }

        if !to_report.is_empty() {
            local = self.runtime.list().await?;
        }
        for name in &to_report {
            let Some(observed) = local.get(name) else {
                continue;
            };
            let container_report = ContainerReport {
                state: observed.state.clone(),
                ips: observed.ips.clone(),
                date_created: observed.created,
            };
            match self.api.update_container(name, &container_report).await {
                Ok(()) => {
                    self.state.ips.insert(name.clone(), observed.ips.clone());
                    report.reported += 1;
                }
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(container = %name, error = %e, "Container report rejected");
                }
            }
        }

        self.relay_console(desired.keys()).await;
        if let Err(e) = self.logs.flush(self.api.as_ref(), false).await {
            tracing::warn!(error = %e, pending = self.logs.pending(), "Log relay deferred");
        }

        self.state.retain_containers(desired.keys());
        self.state.save(&self.config.state_dir)?;

        if report.is_idle() {
            tracing::debug!("Cycle converged with nothing to do");
        } else {
            tracing::info!(?report, "Cycle converged");
        }
        Ok(CycleOutcome::Converged(report))
    }

    /// Apply one action. Returns true if the container should be reported.
    async fn apply(
        &self,
        action: &Action,
        want: Option<&RemoteContainer>,
        report: &mut CycleReport,
    ) -> std::result::Result<bool, RuntimeError> {
        match (action, want) {
            (Action::Create(name), Some(want)) => {
                tracing::info!(container = %name, "Creating container");
                self.create(want).await?;
                report.created += 1;
                Ok(true)
            }
            (Action::Recreate(name), Some(want)) => {
                tracing::info!(container = %name, "Re-creating container");
                self.runtime.destroy(name).await?;
                report.destroyed += 1;
                self.create(want).await?;
                report.created += 1;
                Ok(true)
            }
            (Action::Destroy(name), _) => {
                tracing::info!(container = %name, "Destroying container");
                self.runtime.destroy(name).await?;
                report.destroyed += 1;
                Ok(false)
            }
            (Action::Start(name), _) => {
                tracing::debug!(container = %name, "Starting container");
                self.runtime.start(name).await?;
                report.toggled += 1;
                Ok(true)
            }
            (Action::Stop(name), _) => {
                tracing::debug!(container = %name, "Stopping container");
                self.runtime.stop(name).await?;
                report.toggled += 1;
                Ok(true)
            }
            (Action::Report(_), _) => Ok(true),
            (Action::Create(_) | Action::Recreate(_), None) => Ok(false),
        }
    }

    /// Create, mount, start and kick off init scripts for a container.
    async fn create(&self, want: &RemoteContainer) -> std::result::Result<(), RuntimeError> {
        let spec = ContainerSpec::from_remote(want).map_err(|message| RuntimeError::CommandFailed {
            command: format!("create {}", want.name),
            status: "invalid".to_string(),
            stderr: message,
        })?;

        self.runtime.create(&want.name, &spec).await?;
        let scripts = want.scripts();
        let setup = async {
            for mount in &want.mounts {
                self.runtime.mount(&want.name, mount).await?;
            }
            if want.keep_running || !scripts.is_empty() {
                self.runtime.start(&want.name).await?;
            }
            Ok::<(), RuntimeError>(())
        };
        // A half-built container would look converged to the next plan and
        // never get its mounts or init scripts.
        if let Err(e) = setup.await {
            if let Err(cleanup) = self.runtime.destroy(&want.name).await {
                tracing::warn!(container = %want.name, error = %cleanup, "Unable to remove partial container");
            }
            return Err(e);
        }

        if !scripts.is_empty() {
            self.init.spawn(
                want.name.clone(),
                scripts,
                want.one_shot,
                Arc::clone(&self.runtime),
                Arc::clone(&self.logs),
            );
        }
        Ok(())
    }

    /// Push facts if they changed since they were last accepted.
    async fn push_facts(&mut self) -> Result<()> {
        let facts = (self.facts)();
        if self.state.facts.as_ref() == Some(&facts) {
            return Ok(());
        }
        tracing::info!(?facts, "Updating host facts");
        self.api.update_host(&facts).await?;
        self.state.facts = Some(facts);
        Ok(())
    }

    /// Handle finished init runs: one-shot containers are destroyed.
    ///
    /// Returns the one-shots that are gone from the control plane. A
    /// one-shot whose destroy request could not be delivered is retried on
    /// the next call.
    async fn finish_init(
        &mut self,
        outcomes: Vec<InitOutcome>,
        report: &mut CycleReport,
    ) -> Result<BTreeSet<Name>> {
        for outcome in outcomes {
            tracing::info!(container = %outcome.container, scripts = ?outcome.exit_codes, "Init scripts finished");
            if outcome.one_shot {
                self.finished_one_shots.insert(outcome.container);
            }
        }

        let mut reaped = BTreeSet::new();
        let pending: Vec<Name> = self.finished_one_shots.iter().cloned().collect();
        for name in pending {
            match self.api.request_destroy(&name).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(container = %name, error = %e, "Destroy request rejected, removing locally");
                }
            }
            self.finished_one_shots.remove(&name);
            match self.runtime.destroy(&name).await {
                Ok(()) => report.destroyed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(container = %name, error = %e, "Unable to destroy one-shot container");
                }
            }
            reaped.insert(name);
        }
        Ok(reaped)
    }

    /// Buffer new console output for each container.
    async fn relay_console<'a>(&mut self, containers: impl Iterator<Item = &'a Name>) {
        for name in containers {
            let Some(path) = self.runtime.console_log_path(name) else {
                continue;
            };
            let offset = self.state.log_offsets.get(name).copied().unwrap_or(0);
            match self.logs.tail_file(name, CONSOLE_LOG, &path, offset).await {
                Ok(next) => {
                    self.state.log_offsets.insert(name.clone(), next);
                }
                Err(e) => {
                    tracing::warn!(container = %name, path = %path.display(), error = %e, "Unable to read console log");
                }
            }
        }
    }

    /// Wait for init runs, handle one-shots, flush all logs and save state.
    ///
    /// # Errors
    ///
    /// Returns an error if the control API cannot be reached or state
    /// cannot be saved.
    pub async fn drain(&mut self) -> Result<()> {
        let outcomes = self.init.wait_all().await;
        let mut report = CycleReport::default();
        self.finish_init(outcomes, &mut report).await?;
        self.logs.flush(self.api.as_ref(), true).await?;
        self.state.save(&self.config.state_dir)
    }

    /// Run cycles forever, one per poll interval.
    ///
    /// Returns only when a self-update requires a restart.
    ///
    /// # Errors
    ///
    /// Returns non-transient errors such as an unusable config.
    pub async fn run(&mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.run_cycle().await {
                Ok(CycleOutcome::Restart) => {
                    if let Err(e) = self.drain().await {
                        tracing::warn!(error = %e, "Unable to drain before restart");
                    }
                    return Ok(());
                }
                Ok(CycleOutcome::Converged(_)) => {}
                Err(e) if e.is_transient() => {
                    tracing::error!(error = %e, "Cycle aborted, retrying next interval");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
