//! Local container runtime.
//!
//! The reconcile loop drives containers through the `ContainerRuntime`
//! trait. `LxcRuntime` shells out to the `lxc` client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use corral_core::{ContainerState, Name};

use crate::types::{MountSpec, RemoteContainer};

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A runtime command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status, or `signal` if killed.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Spawning a command or touching the filesystem failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// A container as observed on this host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalContainer {
    /// Current state.
    pub state: ContainerState,
    /// Non-loopback addresses.
    pub ips: Vec<String>,
    /// Creation time, seconds since the epoch.
    pub created: Option<i64>,
}

/// What to build a container from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image template.
    pub template: String,
    /// Template release.
    pub release: String,
    /// Memory limit in bytes.
    pub max_memory: Option<u64>,
}

impl ContainerSpec {
    /// Build the spec for a desired container.
    ///
    /// # Errors
    ///
    /// Returns a message if the template or release is missing.
    pub fn from_remote(container: &RemoteContainer) -> std::result::Result<Self, String> {
        let (Some(template), Some(release)) = (&container.template, &container.release) else {
            return Err(format!("container {} has no template/release", container.name));
        };
        Ok(Self {
            template: template.clone(),
            release: release.clone(),
            max_memory: container.max_memory.filter(|m| *m > 0),
        })
    }
}

/// Operations the agent needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Containers present on this host.
    async fn list(&self) -> Result<BTreeMap<Name, LocalContainer>>;

    /// Create a stopped container.
    async fn create(&self, name: &Name, spec: &ContainerSpec) -> Result<()>;

    /// Start a container.
    async fn start(&self, name: &Name) -> Result<()>;

    /// Stop a container.
    async fn stop(&self, name: &Name) -> Result<()>;

    /// Stop and delete a container, releasing its mounts.
    async fn destroy(&self, name: &Name) -> Result<()>;

    /// Run `script` in the container's shell.
    ///
    /// Combined stdout and stderr are sent to `output` as they arrive.
    /// Returns the exit code.
    async fn exec_script(
        &self,
        name: &Name,
        script: &str,
        output: UnboundedSender<Vec<u8>>,
    ) -> Result<i32>;

    /// Where the container's console log is written, if anywhere.
    fn console_log_path(&self, name: &Name) -> Option<PathBuf>;

    /// Mount shared storage and bind it into the container.
    async fn mount(&self, name: &Name, mount: &MountSpec) -> Result<()>;

    /// Release every shared-storage mount of the container.
    async fn unmount(&self, name: &Name) -> Result<()>;
}

/// Runtime backed by the `lxc` command-line client.
#[derive(Debug, Clone)]
pub struct LxcRuntime {
    program: PathBuf,
    log_root: PathBuf,
    mount_root: PathBuf,
}

impl LxcRuntime {
    /// Create a runtime keeping host-side mounts under `mount_root`.
    #[must_use]
    pub fn new(mount_root: PathBuf) -> Self {
        Self {
            program: PathBuf::from("lxc"),
            log_root: PathBuf::from("/var/log/lxd"),
            mount_root,
        }
    }

    /// Override the directory holding per-container console logs.
    #[must_use]
    pub fn with_log_root(mut self, log_root: PathBuf) -> Self {
        self.log_root = log_root;
        self
    }

    async fn run(program: &Path, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        Err(RuntimeError::CommandFailed {
            command: format!("{} {}", program.display(), args.join(" ")),
            status: output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn lxc(&self, args: &[&str]) -> Result<Vec<u8>> {
        Self::run(&self.program, args).await
    }

    fn mount_dir(&self, name: &Name) -> PathBuf {
        self.mount_root.join(name.as_str())
    }
}

/// Image architecture name for the running CPU.
fn image_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Parse `lxc list --format=json` output.
fn parse_list(raw: &[u8]) -> Result<BTreeMap<Name, LocalContainer>> {
    let entries: Vec<Value> = serde_json::from_slice(raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut containers = BTreeMap::new();
    for entry in entries {
        let Some(name) = entry["name"].as_str().and_then(|n| Name::parse(n).ok()) else {
            tracing::debug!(entry = %entry["name"], "Skipping container with unusable name");
            continue;
        };
        let state = ContainerState::from(entry["status"].as_str().unwrap_or_default().to_string());

        let mut ips = Vec::new();
        if let Some(networks) = entry["state"]["network"].as_object() {
            for (adapter, props) in networks {
                if adapter == "lo" {
                    continue;
                }
                let addresses = props["addresses"].as_array().into_iter().flatten();
                ips.extend(addresses.filter_map(|a| a["address"].as_str().map(str::to_string)));
            }
        }

        let created = entry["created_at"]
            .as_str()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp());

        containers.insert(name, LocalContainer { state, ips, created });
    }
    Ok(containers)
}

#[async_trait]
impl ContainerRuntime for LxcRuntime {
    async fn list(&self) -> Result<BTreeMap<Name, LocalContainer>> {
        parse_list(&self.lxc(&["list", "--format=json"]).await?)
    }

    async fn create(&self, name: &Name, spec: &ContainerSpec) -> Result<()> {
        let image = format!("images:{}/{}/{}", spec.template, spec.release, image_arch());
        let memory = spec
            .max_memory
            .map(|bytes| format!("--config=limits.memory={}MB", bytes / 1_000_000));

        let mut args = vec!["init", image.as_str(), name.as_str()];
        if let Some(memory) = &memory {
            args.push(memory.as_str());
        }
        self.lxc(&args).await?;
        Ok(())
    }

    async fn start(&self, name: &Name) -> Result<()> {
        self.lxc(&["start", name.as_str()]).await?;
        Ok(())
    }

    async fn stop(&self, name: &Name) -> Result<()> {
        self.lxc(&["stop", name.as_str()]).await?;
        Ok(())
    }

    async fn destroy(&self, name: &Name) -> Result<()> {
        self.lxc(&["delete", "--force", name.as_str()]).await?;
        self.unmount(name).await
    }

    async fn exec_script(
        &self,
        name: &Name,
        script: &str,
        output: UnboundedSender<Vec<u8>>,
    ) -> Result<i32> {
        let mut child = Command::new(&self.program)
            .args(["exec", name.as_str(), "--", "bash", "-s"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(b"exec 2>&1\n").await?;
            stdin.write_all(script.as_bytes()).await?;
        }

        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = vec![0_u8; 4096];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if output.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }

        let status = child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    fn console_log_path(&self, name: &Name) -> Option<PathBuf> {
        Some(self.log_root.join(name.as_str()).join("console.log"))
    }

    async fn mount(&self, name: &Name, mount: &MountSpec) -> Result<()> {
        let (Some(kind), Some(source)) = (&mount.kind, &mount.source) else {
            return Err(RuntimeError::CommandFailed {
                command: format!("mount {}", mount.name),
                status: "skipped".to_string(),
                stderr: "shared storage has no type or source".to_string(),
            });
        };
        let dir = self.mount_dir(name).join(&mount.name);
        tokio::fs::create_dir_all(&dir).await?;
        let dir = dir.to_string_lossy().into_owned();

        Self::run(Path::new("mount"), &["-t", kind.as_str(), source.as_str(), dir.as_str()]).await?;
        let device_source = format!("source={dir}");
        let device_path = format!("path={}", mount.directory);
        self.lxc(&[
            "config",
            "device",
            "add",
            name.as_str(),
            mount.name.as_str(),
            "disk",
            device_source.as_str(),
            device_path.as_str(),
        ])
        .await?;
        Ok(())
    }

    async fn unmount(&self, name: &Name) -> Result<()> {
        let root = self.mount_dir(name);
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            let target = dir.to_string_lossy().into_owned();
            Self::run(Path::new("umount"), &[target.as_str()]).await?;
            tokio::fs::remove_dir(&dir).await?;
        }
        tokio::fs::remove_dir(&root).await?;
        Ok(())
    }
}

/// An in-memory runtime for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    /// Records every operation and keeps containers in a map.
    #[derive(Default)]
    pub struct MockRuntime {
        containers: Mutex<BTreeMap<Name, LocalContainer>>,
        mounts: Mutex<BTreeMap<Name, Vec<String>>>,
        failing: Mutex<BTreeSet<Name>>,
        failing_ops: Mutex<BTreeSet<(String, Name)>>,
        ops: Mutex<Vec<String>>,
        clock: Mutex<i64>,
        log_root: Option<PathBuf>,
    }

    impl MockRuntime {
        /// Create an empty runtime.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a runtime whose console logs live under `root`.
        #[must_use]
        pub fn with_log_root(root: PathBuf) -> Self {
            Self {
                log_root: Some(root),
                ..Self::default()
            }
        }

        /// Add an existing container.
        pub fn insert(&self, name: &Name, state: ContainerState, ips: &[&str]) {
            self.containers.lock().insert(
                name.clone(),
                LocalContainer {
                    state,
                    ips: ips.iter().map(|s| (*s).to_string()).collect(),
                    created: Some(1),
                },
            );
        }

        /// Make every lifecycle operation on `name` fail.
        pub fn fail(&self, name: &Name) {
            self.failing.lock().insert(name.clone());
        }

        /// Make only `op` (e.g. `mount`) on `name` fail.
        pub fn fail_op(&self, op: &str, name: &Name) {
            self.failing_ops.lock().insert((op.to_string(), name.clone()));
        }

        /// Stop injecting failures for `name`.
        pub fn heal(&self, name: &Name) {
            self.failing.lock().remove(name);
            self.failing_ops.lock().retain(|(_, n)| n != name);
        }

        /// Operations performed so far, e.g. `start c1`.
        #[must_use]
        pub fn ops(&self) -> Vec<String> {
            self.ops.lock().clone()
        }

        /// Forget recorded operations.
        pub fn clear_ops(&self) {
            self.ops.lock().clear();
        }

        /// Current state of a container.
        #[must_use]
        pub fn get(&self, name: &Name) -> Option<LocalContainer> {
            self.containers.lock().get(name).cloned()
        }

        /// Mount names currently held for a container.
        #[must_use]
        pub fn mounts(&self, name: &Name) -> Vec<String> {
            self.mounts.lock().get(name).cloned().unwrap_or_default()
        }

        fn record(&self, op: &str, name: &Name) -> Result<()> {
            self.ops.lock().push(format!("{op} {name}"));
            if self.failing.lock().contains(name)
                || self.failing_ops.lock().contains(&(op.to_string(), name.clone()))
            {
                return Err(RuntimeError::CommandFailed {
                    command: format!("{op} {name}"),
                    status: "1".to_string(),
                    stderr: "injected failure".to_string(),
                });
            }
            Ok(())
        }

        fn set_state(&self, name: &Name, state: ContainerState, ips: Vec<String>) {
            if let Some(c) = self.containers.lock().get_mut(name) {
                c.state = state;
                c.ips = ips;
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn list(&self) -> Result<BTreeMap<Name, LocalContainer>> {
            Ok(self.containers.lock().clone())
        }

        async fn create(&self, name: &Name, _spec: &ContainerSpec) -> Result<()> {
            self.record("create", name)?;
            let created = {
                let mut clock = self.clock.lock();
                *clock += 1;
                *clock + 1_000
            };
            self.containers.lock().insert(
                name.clone(),
                LocalContainer {
                    state: ContainerState::Stopped,
                    ips: Vec::new(),
                    created: Some(created),
                },
            );
            Ok(())
        }

        async fn start(&self, name: &Name) -> Result<()> {
            self.record("start", name)?;
            self.set_state(name, ContainerState::Running, vec!["10.0.3.2".to_string()]);
            Ok(())
        }

        async fn stop(&self, name: &Name) -> Result<()> {
            self.record("stop", name)?;
            self.set_state(name, ContainerState::Stopped, Vec::new());
            Ok(())
        }

        async fn destroy(&self, name: &Name) -> Result<()> {
            self.record("destroy", name)?;
            self.containers.lock().remove(name);
            self.mounts.lock().remove(name);
            Ok(())
        }

        async fn exec_script(
            &self,
            name: &Name,
            script: &str,
            output: UnboundedSender<Vec<u8>>,
        ) -> Result<i32> {
            self.record("exec", name)?;
            let _ = output.send(format!("ran {} bytes\n", script.len()).into_bytes());
            Ok(i32::from(script.contains("exit 1")))
        }

        fn console_log_path(&self, name: &Name) -> Option<PathBuf> {
            self.log_root.as_ref().map(|root| root.join(format!("{name}.log")))
        }

        async fn mount(&self, name: &Name, mount: &MountSpec) -> Result<()> {
            self.record("mount", name)?;
            self.mounts
                .lock()
                .entry(name.clone())
                .or_default()
                .push(mount.name.clone());
            Ok(())
        }

        async fn unmount(&self, name: &Name) -> Result<()> {
            self.record("unmount", name)?;
            self.mounts.lock().remove(name);
            Ok(())
        }
    }
}
