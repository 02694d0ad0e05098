//! Wire types exchanged with the control API.

use serde::{Deserialize, Serialize};

use corral_core::{ContainerState, Name};

/// A host record as returned by `GET /host/{name}/?with_containers`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteHost {
    /// Host name.
    pub name: Name,
    /// Agent version the control plane expects.
    #[serde(default)]
    pub client_version: Option<String>,
    /// Containers assigned to this host.
    #[serde(default)]
    pub containers: Vec<RemoteContainer>,
}

/// Desired state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteContainer {
    /// Container name.
    pub name: Name,
    /// Image template, e.g. `ubuntu-cloud`.
    #[serde(default)]
    pub template: Option<String>,
    /// Template release, e.g. `trusty`.
    #[serde(default)]
    pub release: Option<String>,
    /// Script given with the original request.
    #[serde(default)]
    pub init_script: Option<String>,
    /// Memory limit in bytes.
    #[serde(default)]
    pub max_memory: Option<u64>,
    /// Last reported creation time.
    #[serde(default)]
    pub date_created: Option<i64>,
    /// Last reported state.
    #[serde(default)]
    pub state: ContainerState,
    /// Whether the container should be running.
    #[serde(default = "default_true")]
    pub keep_running: bool,
    /// Destroy and recreate on the next cycle.
    #[serde(default)]
    pub re_create: bool,
    /// Destroy once the init scripts complete.
    #[serde(default)]
    pub one_shot: bool,
    /// Init scripts run after the first start.
    #[serde(default)]
    pub initscripts: Vec<InitScriptSpec>,
    /// Shared storage to bind into the container.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

impl RemoteContainer {
    /// Scripts to run after the first start: the request's own script, if
    /// any, followed by the attached init scripts.
    #[must_use]
    pub fn scripts(&self) -> Vec<InitScriptSpec> {
        self.init_script
            .iter()
            .filter(|content| !content.trim().is_empty())
            .map(|content| InitScriptSpec {
                name: REQUEST_SCRIPT.to_string(),
                content: content.clone(),
            })
            .chain(self.initscripts.iter().cloned())
            .collect()
    }
}

/// Name under which a request's own script is logged.
pub const REQUEST_SCRIPT: &str = "init_script";

const fn default_true() -> bool {
    true
}

/// An init script attached to a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitScriptSpec {
    /// Script name, used in log markers.
    pub name: String,
    /// Script body, fed to the container's shell.
    pub content: String,
}

/// A resolved shared-storage mount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountSpec {
    /// Mount name, unique within the container.
    pub name: String,
    /// Path inside the container.
    pub directory: String,
    /// Filesystem type of the storage, e.g. `nfs`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Storage source passed to `mount`.
    #[serde(default)]
    pub source: Option<String>,
}

/// Host properties the agent reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// OS identifier, e.g. `ubuntu`.
    pub distro_id: String,
    /// OS release, e.g. `14.04`.
    pub distro_release: String,
    /// OS codename, e.g. `trusty`.
    pub distro_codename: String,
    /// Total memory in bytes.
    pub mem_total: u64,
    /// Number of CPUs.
    pub cpu_total: u64,
    /// CPU brand string.
    pub cpu_type: String,
}

/// Body of `POST /host/`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    /// Host name.
    pub name: Name,
    /// Plaintext API key; the server stores only its hash.
    pub api_key: String,
    /// Host facts.
    #[serde(flatten)]
    pub facts: HostFacts,
}

/// Observed container properties sent with `PATCH .../container/{c}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerReport {
    /// Observed state.
    pub state: ContainerState,
    /// Observed addresses.
    pub ips: Vec<String>,
    /// Creation time of the local container, acknowledging a recreate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<i64>,
}

/// Error body returned by the control API.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// Error details.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_host_parses_resolved_view() {
        let host: RemoteHost = serde_json::from_value(json!({
            "name": "H",
            "enlisted": true,
            "client_version": "0.2.0",
            "containers": [{
                "name": "C",
                "template": "debian",
                "release": "jessie",
                "state": "RUNNING",
                "initscripts": [{"name": "setup", "content": "echo hi"}],
                "mounts": [{"name": "data", "storage": "nfs1", "directory": "/data",
                            "type": "nfs", "source": "fs:/export"}]
            }]
        }))
        .unwrap();

        let c = &host.containers[0];
        assert_eq!(host.client_version.as_deref(), Some("0.2.0"));
        assert!(c.keep_running);
        assert!(!c.re_create);
        assert_eq!(c.state, ContainerState::Running);
        assert_eq!(c.mounts[0].kind.as_deref(), Some("nfs"));
        assert_eq!(c.initscripts[0].name, "setup");
    }

    #[test]
    fn request_script_runs_first() {
        let c: RemoteContainer = serde_json::from_value(json!({
            "name": "C",
            "init_script": "apt-get update",
            "initscripts": [{"name": "setup", "content": "echo hi"}]
        }))
        .unwrap();
        let names: Vec<_> = c.scripts().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec![REQUEST_SCRIPT, "setup"]);

        let blank: RemoteContainer =
            serde_json::from_value(json!({"name": "C", "init_script": "  "})).unwrap();
        assert!(blank.scripts().is_empty());
    }

    #[test]
    fn registration_is_flat() {
        let body = serde_json::to_value(Registration {
            name: Name::parse("H").unwrap(),
            api_key: "K".into(),
            facts: HostFacts {
                distro_id: "ubuntu".into(),
                distro_release: "14.04".into(),
                distro_codename: "trusty".into(),
                mem_total: 1024,
                cpu_total: 2,
                cpu_type: "x86_64".into(),
            },
        })
        .unwrap();
        assert_eq!(body["name"], "H");
        assert_eq!(body["cpu_total"], 2);
        assert!(body.get("facts").is_none());
    }

    #[test]
    fn report_omits_unknown_creation_time() {
        let body = serde_json::to_value(ContainerReport {
            state: ContainerState::Stopped,
            ips: vec![],
            date_created: None,
        })
        .unwrap();
        assert_eq!(body, json!({"state": "STOPPED", "ips": []}));
    }
}
