//! Domain types stored in the model store.
//!
//! Each entity is a plain struct decoded from its validated on-disk record,
//! paired with the static [`Schema`] that guards writes. Structs handed out
//! by the store are read snapshots; mutation goes through the store.

use corral_core::{ContainerState, Name};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::schema::{ChildSpec, FieldDefault, FieldSpec, FieldType, Props, Schema};

/// An entity kind that can be stored.
pub trait Model: DeserializeOwned + Send + 'static {
    /// Schema used to validate records of this kind.
    fn schema() -> &'static Schema;

    /// Decode a record from its stored properties.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the stored properties do not
    /// match the struct.
    fn decode(name: &Name, mut props: Props) -> Result<Self> {
        props.insert("name".to_string(), Value::String(name.to_string()));
        serde_json::from_value(Value::Object(props))
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", Self::schema().kind)))
    }
}

// =============================================================================
// Schemas
// =============================================================================

/// Init script record, used under containers, requests and users.
pub static INIT_SCRIPT_SCHEMA: Schema = Schema {
    kind: "init script",
    fields: &[FieldSpec::required("content", FieldType::Str)],
    children: &[],
};

/// Mount record, binding a shared storage into a container directory.
pub static MOUNT_SCHEMA: Schema = Schema {
    kind: "mount",
    fields: &[
        FieldSpec::required("storage", FieldType::Str),
        FieldSpec::required("directory", FieldType::Str),
    ],
    children: &[],
};

static WORKLOAD_CHILDREN: [ChildSpec; 2] = [
    ChildSpec {
        key: "initscripts",
        schema: &INIT_SCRIPT_SCHEMA,
    },
    ChildSpec {
        key: "mounts",
        schema: &MOUNT_SCHEMA,
    },
];

/// Container record scoped under a host.
pub static CONTAINER_SCHEMA: Schema = Schema {
    kind: "container",
    fields: &[
        FieldSpec::optional("template", FieldType::Str),
        FieldSpec::optional("release", FieldType::Str),
        FieldSpec::optional("init_script", FieldType::Str),
        FieldSpec::optional("max_memory", FieldType::Count),
        FieldSpec::optional("date_requested", FieldType::Int),
        FieldSpec::optional("date_created", FieldType::Int),
        FieldSpec::with_default("state", FieldType::Str, FieldDefault::Str("UNKNOWN")),
        FieldSpec::with_default("keep_running", FieldType::Bool, FieldDefault::Bool(true)),
        FieldSpec::with_default("re_create", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::with_default("one_shot", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::optional("ips", FieldType::StrList),
        FieldSpec::optional("requested_by", FieldType::Str),
    ],
    children: &WORKLOAD_CHILDREN,
};

/// Queued container request.
pub static CONTAINER_REQUEST_SCHEMA: Schema = Schema {
    kind: "container request",
    fields: &[
        FieldSpec::optional("template", FieldType::Str),
        FieldSpec::optional("release", FieldType::Str),
        FieldSpec::optional("init_script", FieldType::Str),
        FieldSpec::optional("max_memory", FieldType::Count),
        FieldSpec::optional("date_requested", FieldType::Int),
        FieldSpec::with_default("keep_running", FieldType::Bool, FieldDefault::Bool(true)),
        FieldSpec::with_default("one_shot", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::required("requested_by", FieldType::Str),
    ],
    children: &WORKLOAD_CHILDREN,
};

/// Registered host.
pub static HOST_SCHEMA: Schema = Schema {
    kind: "host",
    fields: &[
        FieldSpec::required("distro_id", FieldType::Str),
        FieldSpec::required("distro_release", FieldType::Str),
        FieldSpec::required("distro_codename", FieldType::Str),
        FieldSpec::required("mem_total", FieldType::Count),
        FieldSpec::required("cpu_total", FieldType::Count),
        FieldSpec::required("cpu_type", FieldType::Str),
        FieldSpec::with_default("max_containers", FieldType::Count, FieldDefault::Int(0)),
        FieldSpec::with_default("enlisted", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::with_default("api_key", FieldType::Secret, FieldDefault::Str("")),
    ],
    children: &[ChildSpec {
        key: "containers",
        schema: &CONTAINER_SCHEMA,
    }],
};

/// User account.
pub static USER_SCHEMA: Schema = Schema {
    kind: "user",
    fields: &[
        FieldSpec::required("nickname", FieldType::Str),
        FieldSpec::optional("openid", FieldType::Str),
        FieldSpec::with_default("approved", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::with_default("admin", FieldType::Bool, FieldDefault::Bool(false)),
        FieldSpec::with_default("api_key", FieldType::Secret, FieldDefault::Str("")),
    ],
    children: &[ChildSpec {
        key: "initscripts",
        schema: &INIT_SCRIPT_SCHEMA,
    }],
};

/// Shared storage definition.
pub static SHARED_STORAGE_SCHEMA: Schema = Schema {
    kind: "shared storage",
    fields: &[
        FieldSpec::required("type", FieldType::Str),
        FieldSpec::required("source", FieldType::Str),
    ],
    children: &[],
};

// =============================================================================
// Entities
// =============================================================================

/// A registered host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// Unique host name.
    pub name: Name,
    /// Distribution id, e.g. `ubuntu`.
    pub distro_id: String,
    /// Distribution release, e.g. `14.04`.
    pub distro_release: String,
    /// Distribution codename, e.g. `trusty`.
    pub distro_codename: String,
    /// Total memory in bytes.
    pub mem_total: u64,
    /// Number of CPUs.
    pub cpu_total: u64,
    /// CPU model string.
    pub cpu_type: String,
    /// Container cap; 0 means unlimited.
    #[serde(default)]
    pub max_containers: u64,
    /// Set by server policy, never by the host itself.
    #[serde(default)]
    pub enlisted: bool,
    /// Salted hash of the host's API key.
    #[serde(default)]
    pub api_key: String,
}

impl Host {
    /// Returns true if the host can take `count + 1` containers.
    #[must_use]
    pub const fn has_capacity(&self, count: u64) -> bool {
        self.max_containers == 0 || count < self.max_containers
    }
}

impl Model for Host {
    fn schema() -> &'static Schema {
        &HOST_SCHEMA
    }
}

/// A container assigned to a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    /// Container name, unique within its host.
    pub name: Name,
    /// Image template.
    #[serde(default)]
    pub template: Option<String>,
    /// Template release.
    #[serde(default)]
    pub release: Option<String>,
    /// Inline init script run after the first start.
    #[serde(default)]
    pub init_script: Option<String>,
    /// Memory limit in bytes.
    #[serde(default)]
    pub max_memory: Option<u64>,
    /// Unix time the container was requested.
    #[serde(default)]
    pub date_requested: Option<i64>,
    /// Unix time the agent last created the container.
    #[serde(default)]
    pub date_created: Option<i64>,
    /// Last state reported by the agent.
    #[serde(default)]
    pub state: ContainerState,
    /// Whether the container should be running.
    #[serde(default = "default_true")]
    pub keep_running: bool,
    /// Request to destroy and recreate the container.
    #[serde(default)]
    pub re_create: bool,
    /// Destroy once init scripts have completed.
    #[serde(default)]
    pub one_shot: bool,
    /// Addresses reported by the agent.
    #[serde(default)]
    pub ips: Vec<String>,
    /// User who requested the container.
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl Model for Container {
    fn schema() -> &'static Schema {
        &CONTAINER_SCHEMA
    }
}

/// A queued, not yet placed container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRequest {
    /// Request name, becomes the container name on placement.
    pub name: Name,
    /// Image template.
    #[serde(default)]
    pub template: Option<String>,
    /// Template release.
    #[serde(default)]
    pub release: Option<String>,
    /// Inline init script.
    #[serde(default)]
    pub init_script: Option<String>,
    /// Memory limit in bytes.
    #[serde(default)]
    pub max_memory: Option<u64>,
    /// Unix time the request was queued.
    #[serde(default)]
    pub date_requested: Option<i64>,
    /// Whether the container should be running.
    #[serde(default = "default_true")]
    pub keep_running: bool,
    /// Destroy once init scripts have completed.
    #[serde(default)]
    pub one_shot: bool,
    /// User who submitted the request.
    pub requested_by: String,
}

impl Model for ContainerRequest {
    fn schema() -> &'static Schema {
        &CONTAINER_REQUEST_SCHEMA
    }
}

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User name, used in `Token name:secret`.
    pub name: Name,
    /// Display name.
    pub nickname: String,
    /// External identity reference.
    #[serde(default)]
    pub openid: Option<String>,
    /// Whether the user may submit work.
    #[serde(default)]
    pub approved: bool,
    /// Whether the user may administer the fleet.
    #[serde(default)]
    pub admin: bool,
    /// Salted hash of the user's API key.
    #[serde(default)]
    pub api_key: String,
}

impl Model for User {
    fn schema() -> &'static Schema {
        &USER_SCHEMA
    }
}

/// A reusable or container-bound init script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitScript {
    /// Script name.
    pub name: Name,
    /// Script body.
    pub content: String,
}

impl Model for InitScript {
    fn schema() -> &'static Schema {
        &INIT_SCRIPT_SCHEMA
    }
}

/// A request to bind a shared storage into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Mount name.
    pub name: Name,
    /// Name of the referenced [`SharedStorage`].
    pub storage: String,
    /// Directory inside the container.
    pub directory: String,
}

impl Model for Mount {
    fn schema() -> &'static Schema {
        &MOUNT_SCHEMA
    }
}

/// A named shared storage definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStorage {
    /// Storage name.
    pub name: Name,
    /// Storage type, e.g. `nfs`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Source location.
    pub source: String,
}

impl Model for SharedStorage {
    fn schema() -> &'static Schema {
        &SHARED_STORAGE_SCHEMA
    }
}

const fn default_true() -> bool {
    true
}
