//! On-disk layout.
//!
//! ```text
//! <root>/
//!   hosts/<host>/
//!     .lock                       per-record lock
//!     props.json                  record fields, replaced atomically
//!     heartbeat.log               append-only unix timestamps
//!     containers/<container>/
//!       props.json
//!       initscripts/<script>/props.json
//!       mounts/<mount>/props.json
//!       logs/<logname>            append-only raw text
//!   container_requests/<request>/ (same children as containers)
//!   users/<user>/initscripts/<script>/
//!   shared_storage/<storage>/
//! ```

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use corral_core::Name;

use crate::schema::dirs;
use crate::types::{
    Container, ContainerRequest, Host, InitScript, Model, Mount, SharedStorage, User,
};

/// Record properties file.
pub const PROPS_FILE: &str = "props.json";

/// Per-record lock file.
pub const LOCK_FILE: &str = ".lock";

/// Append-only heartbeat log of a host.
pub const HEARTBEAT_FILE: &str = "heartbeat.log";

/// Directory holding the named logs of a container.
pub const LOGS_DIR: &str = "logs";

/// A typed handle on one collection directory.
///
/// Collections are cheap values; they only describe where records of kind
/// `M` live relative to the store root.
pub struct Collection<M> {
    dir: PathBuf,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Collection<M> {
    fn new(segments: &[&str]) -> Self {
        Self {
            dir: segments.iter().collect(),
            _model: PhantomData,
        }
    }

    /// Path of the collection relative to the store root.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.dir
    }

    /// Relative path of one record directory.
    #[must_use]
    pub fn record_path(&self, name: &Name) -> PathBuf {
        self.dir.join(name.as_str())
    }

    /// Entity kind, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        M::schema().kind
    }
}

impl<M> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for Collection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Collection({})", self.dir.display())
    }
}

/// All hosts.
#[must_use]
pub fn hosts() -> Collection<Host> {
    Collection::new(&[dirs::HOSTS])
}

/// Containers of one host.
#[must_use]
pub fn containers(host: &Name) -> Collection<Container> {
    Collection::new(&[dirs::HOSTS, host.as_str(), "containers"])
}

/// Init scripts of one container.
#[must_use]
pub fn container_init_scripts(host: &Name, container: &Name) -> Collection<InitScript> {
    Collection::new(&[
        dirs::HOSTS,
        host.as_str(),
        "containers",
        container.as_str(),
        "initscripts",
    ])
}

/// Mounts of one container.
#[must_use]
pub fn container_mounts(host: &Name, container: &Name) -> Collection<Mount> {
    Collection::new(&[
        dirs::HOSTS,
        host.as_str(),
        "containers",
        container.as_str(),
        "mounts",
    ])
}

/// The container request queue.
#[must_use]
pub fn container_requests() -> Collection<ContainerRequest> {
    Collection::new(&[dirs::CONTAINER_REQUESTS])
}

/// All users.
#[must_use]
pub fn users() -> Collection<User> {
    Collection::new(&[dirs::USERS])
}

/// Reusable init scripts of one user.
#[must_use]
pub fn user_init_scripts(user: &Name) -> Collection<InitScript> {
    Collection::new(&[dirs::USERS, user.as_str(), "initscripts"])
}

/// All shared storage definitions.
#[must_use]
pub fn shared_storage() -> Collection<SharedStorage> {
    Collection::new(&[dirs::SHARED_STORAGE])
}
