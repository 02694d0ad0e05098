//! Background init-script runs.
//!
//! Init scripts can take a long time, so each container's scripts run in
//! their own task. The reconcile loop checks for finished runs on its next
//! cycle instead of waiting.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use corral_core::Name;

use crate::logs::{LogRelay, INIT_LOG};
use crate::runtime::ContainerRuntime;
use crate::types::InitScriptSpec;

/// Result of running a container's init scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// The container.
    pub container: Name,
    /// Whether the container should be destroyed now.
    pub one_shot: bool,
    /// Exit code per script, in run order. `None` if it could not be run.
    pub exit_codes: Vec<(String, Option<i32>)>,
}

/// Registry of in-flight init runs.
#[derive(Default)]
pub struct InitTasks {
    tasks: Mutex<HashMap<Name, JoinHandle<InitOutcome>>>,
}

impl InitTasks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers with scripts still running.
    #[must_use]
    pub fn running(&self) -> BTreeSet<Name> {
        self.tasks
            .lock()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Start running `scripts` in `container`, one after another.
    ///
    /// Does nothing if a run for that container is already registered.
    pub fn spawn(
        &self,
        container: Name,
        scripts: Vec<InitScriptSpec>,
        one_shot: bool,
        runtime: Arc<dyn ContainerRuntime>,
        logs: Arc<LogRelay>,
    ) {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&container) {
            return;
        }
        let name = container.clone();
        let task = tokio::spawn(async move {
            let mut exit_codes = Vec::with_capacity(scripts.len());
            for script in scripts {
                let rc = run_script(&name, &script, runtime.as_ref(), &logs).await;
                exit_codes.push((script.name, rc));
            }
            InitOutcome {
                container: name,
                one_shot,
                exit_codes,
            }
        });
        tasks.insert(container, task);
    }

    /// Collect the runs that have finished.
    pub async fn reap(&self) -> Vec<InitOutcome> {
        let finished: Vec<(Name, JoinHandle<InitOutcome>)> = {
            let mut tasks = self.tasks.lock();
            let done: Vec<Name> = tasks
                .iter()
                .filter(|(_, task)| task.is_finished())
                .map(|(name, _)| name.clone())
                .collect();
            done.into_iter()
                .filter_map(|name| tasks.remove(&name).map(|task| (name, task)))
                .collect()
        };
        join_all(finished).await
    }

    /// Wait for every run to finish and collect them.
    pub async fn wait_all(&self) -> Vec<InitOutcome> {
        let all: Vec<(Name, JoinHandle<InitOutcome>)> = self.tasks.lock().drain().collect();
        join_all(all).await
    }
}

async fn join_all(tasks: Vec<(Name, JoinHandle<InitOutcome>)>) -> Vec<InitOutcome> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    for (name, task) in tasks {
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(container = %name, error = %e, "Init task panicked"),
        }
    }
    outcomes
}

/// Run one script, relaying framed output to the `init` log.
async fn run_script(
    container: &Name,
    script: &InitScriptSpec,
    runtime: &dyn ContainerRuntime,
    logs: &LogRelay,
) -> Option<i32> {
    tracing::info!(container = %container, script = %script.name, "Running init script");
    logs.push(
        container,
        INIT_LOG,
        format!(
            "\n== INIT-SCRIPT({}) STARTED at: {}\n",
            script.name,
            chrono::Utc::now().to_rfc3339()
        )
        .as_bytes(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let forward = async {
        while let Some(chunk) = rx.recv().await {
            logs.push(container, INIT_LOG, &chunk);
        }
    };
    let (result, ()) = tokio::join!(runtime.exec_script(container, &script.content, tx), forward);

    let rc = match result {
        Ok(rc) => {
            if rc != 0 {
                tracing::warn!(container = %container, script = %script.name, rc, "Init script failed");
            }
            Some(rc)
        }
        Err(e) => {
            tracing::error!(container = %container, script = %script.name, error = %e, "Unable to run init script");
            None
        }
    };

    logs.push(
        container,
        INIT_LOG,
        format!(
            "\n== INIT-SCRIPT({}) ENDED at: {} RC={}\n",
            script.name,
            chrono::Utc::now().to_rfc3339(),
            rc.unwrap_or(-1)
        )
        .as_bytes(),
    );
    rc
}
