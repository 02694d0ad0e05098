//! Request and response types for control plane operations.

use std::collections::BTreeMap;

use corral_auth::Principal;
use corral_core::Name;
use corral_store::{Container, Host, InitScript, Mount, SharedStorage};
use serde::{Deserialize, Serialize};

/// Who is making a request, as established by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// No credentials were supplied.
    Anonymous,
    /// A host authenticated with its own API key.
    Host(Name),
    /// An authenticated user.
    User(Principal),
}

impl Actor {
    /// Returns true if the actor is the named host.
    #[must_use]
    pub fn is_host(&self, host: &Name) -> bool {
        matches!(self, Self::Host(h) if h == host)
    }

    /// Returns true if the actor is an admin user.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::User(p) if p.admin)
    }

    /// The user principal, if the actor is a user.
    #[must_use]
    pub const fn user(&self) -> Option<&Principal> {
        match self {
            Self::User(p) => Some(p),
            _ => None,
        }
    }
}

/// Allowed `template` → `release` combinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerTypes(BTreeMap<String, Vec<String>>);

impl Default for ContainerTypes {
    fn default() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            "ubuntu-cloud".to_string(),
            vec!["trusty".to_string(), "vivid".to_string(), "precise".to_string()],
        );
        types.insert("debian".to_string(), vec!["jessie".to_string()]);
        Self(types)
    }
}

impl ContainerTypes {
    /// Build a table from explicit entries.
    #[must_use]
    pub fn new(types: BTreeMap<String, Vec<String>>) -> Self {
        Self(types)
    }

    /// Check a template/release pair.
    ///
    /// # Errors
    ///
    /// Returns a message naming the missing or unknown value.
    pub fn validate(&self, template: Option<&str>, release: Option<&str>) -> Result<(), String> {
        let template = template.ok_or("missing required field 'template'")?;
        let releases = self
            .0
            .get(template)
            .ok_or_else(|| format!("invalid template type: {template}"))?;
        let release = release.ok_or("missing required field 'release'")?;
        if releases.iter().any(|r| r == release) {
            Ok(())
        } else {
            Err(format!("invalid release for template {template}: {release}"))
        }
    }
}

/// Configuration for the control plane service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Agent version that hosts are expected to run.
    pub client_version: String,
    /// Value of `enlisted` given to newly registered hosts.
    pub auto_enlist_hosts: bool,
    /// Whether users created after the first are approved immediately.
    pub auto_approve_users: bool,
    /// Allowed container templates and releases.
    pub container_types: ContainerTypes,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            auto_enlist_hosts: true,
            auto_approve_users: false,
            container_types: ContainerTypes::default(),
        }
    }
}

/// A mount with its shared storage resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountView {
    /// Mount name.
    pub name: Name,
    /// Referenced storage name.
    pub storage: String,
    /// Directory inside the container.
    pub directory: String,
    /// Storage type, if the storage still exists.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Storage source, if the storage still exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MountView {
    /// Join a mount with its storage definition.
    #[must_use]
    pub fn resolve(mount: Mount, storage: Option<&SharedStorage>) -> Self {
        Self {
            name: mount.name,
            storage: mount.storage,
            directory: mount.directory,
            kind: storage.map(|s| s.kind.clone()),
            source: storage.map(|s| s.source.clone()),
        }
    }
}

/// A container together with its init scripts and mounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerView {
    /// The container record.
    #[serde(flatten)]
    pub container: Container,
    /// Init scripts to run after creation, in name order.
    #[serde(default)]
    pub initscripts: Vec<InitScript>,
    /// Shared storage mounts.
    #[serde(default)]
    pub mounts: Vec<MountView>,
}

/// A host as returned to API callers. Never carries the API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostView {
    /// Host name.
    pub name: Name,
    /// Distribution id.
    pub distro_id: String,
    /// Distribution release.
    pub distro_release: String,
    /// Distribution codename.
    pub distro_codename: String,
    /// Total memory in bytes.
    pub mem_total: u64,
    /// Number of CPUs.
    pub cpu_total: u64,
    /// CPU model.
    pub cpu_type: String,
    /// Container cap; 0 means unlimited.
    pub max_containers: u64,
    /// Whether the host is enlisted.
    pub enlisted: bool,
    /// Unix time of the last heartbeat.
    #[serde(default)]
    pub last_heartbeat: Option<i64>,
    /// Agent version hosts should run; only sent to the host itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Assigned containers, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerView>>,
}

impl HostView {
    /// Build a view of a host, dropping its API key.
    #[must_use]
    pub fn new(host: Host, last_heartbeat: Option<i64>) -> Self {
        Self {
            name: host.name,
            distro_id: host.distro_id,
            distro_release: host.distro_release,
            distro_codename: host.distro_codename,
            mem_total: host.mem_total,
            cpu_total: host.cpu_total,
            cpu_type: host.cpu_type,
            max_containers: host.max_containers,
            enlisted: host.enlisted,
            last_heartbeat,
            client_version: None,
            containers: None,
        }
    }
}

/// The result of a container update.
#[derive(Debug, Clone)]
pub enum ContainerUpdate {
    /// The container was updated.
    Updated(Container),
    /// A one-shot container reported `DESTROY` and was deleted.
    Destroyed,
}

/// A newly created user and its one-time API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUser {
    /// User name.
    pub name: Name,
    /// Whether the user is approved.
    pub approved: bool,
    /// Whether the user is an admin.
    pub admin: bool,
    /// Plaintext API key. Only ever returned here.
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_container_types() {
        let types = ContainerTypes::default();
        assert!(types.validate(Some("ubuntu-cloud"), Some("trusty")).is_ok());
        assert!(types.validate(Some("debian"), Some("jessie")).is_ok());
        assert!(types.validate(Some("debian"), Some("trusty")).is_err());
        assert!(types.validate(Some("arch"), Some("rolling")).is_err());
        assert!(types.validate(None, Some("trusty")).is_err());
        assert!(types.validate(Some("debian"), None).is_err());
    }

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert!(config.auto_enlist_hosts);
        assert!(!config.auto_approve_users);
        assert_eq!(config.client_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn actor_roles() {
        let h = Name::parse("h").unwrap();
        assert!(Actor::Host(h.clone()).is_host(&h));
        assert!(!Actor::Anonymous.is_host(&h));
        let admin = Actor::User(Principal {
            name: Name::parse("root").unwrap(),
            approved: true,
            admin: true,
        });
        assert!(admin.is_admin());
        assert!(!admin.is_host(&h));
        assert!(admin.user().is_some());
    }

    #[test]
    fn mount_view_omits_unresolved_storage() {
        let mount = Mount {
            name: Name::parse("data").unwrap(),
            storage: "gone".into(),
            directory: "/data".into(),
        };
        let view = MountView::resolve(mount, None);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("type").is_none());
        assert_eq!(json["directory"], "/data");
    }
}
