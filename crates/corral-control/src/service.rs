//! Control plane service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlPlaneService`
//! implementation that applies access rules and server policies on top of the
//! model store, and drives the scheduler from host heartbeats.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use corral_auth::AuthError;
use corral_core::{secret, Name};
use corral_scheduler::{ranking, PlacementScheduler, Scheduler, SchedulerConfig};
use corral_store::schema::take_name;
use corral_store::{
    layout, Container, ContainerRequest, Host, InitScript, Mount, Props, SharedStorage, Store,
    StoreError,
};
use serde_json::Value;

use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::types::{
    Actor, ContainerUpdate, ContainerView, ControlConfig, CreatedUser, HostView, MountView,
};

/// Trait defining the control plane operations.
///
/// Every operation that changes state takes the [`Actor`] established by the
/// gateway and enforces who may perform it.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // Hosts
    // =========================================================================

    /// List host names, optionally filtered by a shell-style pattern.
    async fn list_hosts(&self, pattern: Option<String>) -> Result<Vec<Name>>;

    /// Register a host from its full properties, including `name` and the
    /// plaintext `api_key`.
    ///
    /// Any `enlisted` value in the payload is replaced by server policy.
    ///
    /// # Errors
    ///
    /// Returns a 409-mapped error if the host already exists.
    async fn register_host(&self, props: Props) -> Result<Name>;

    /// Get a host.
    ///
    /// When the actor is the host itself this records a heartbeat and runs
    /// the scheduler before reading, and the view carries the client version.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::HostNotFound` if the host doesn't exist.
    async fn get_host(&self, actor: &Actor, name: &Name, with_containers: bool) -> Result<HostView>;

    /// Merge-update a host.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Forbidden` if a host tries to change `enlisted`.
    async fn update_host(&self, actor: &Actor, name: &Name, props: Props) -> Result<HostView>;

    /// Delete a host and all of its containers.
    async fn delete_host(&self, actor: &Actor, name: &Name) -> Result<()>;

    // =========================================================================
    // Containers
    // =========================================================================

    /// List the containers assigned to a host.
    async fn list_containers(&self, host: &Name) -> Result<Vec<Name>>;

    /// Get a container with its init scripts and resolved mounts.
    async fn get_container(&self, host: &Name, container: &Name) -> Result<ContainerView>;

    /// Create a container directly under a host, bypassing the queue.
    async fn create_container(&self, actor: &Actor, host: &Name, props: Props) -> Result<Name>;

    /// Merge-update a container as reported by its host.
    ///
    /// A one-shot container reporting `DESTROY` is deleted instead.
    async fn update_container(
        &self,
        actor: &Actor,
        host: &Name,
        container: &Name,
        props: Props,
    ) -> Result<ContainerUpdate>;

    /// Delete a container.
    async fn delete_container(&self, actor: &Actor, host: &Name, container: &Name) -> Result<()>;

    /// Append raw output to a container's named log.
    async fn append_log(
        &self,
        actor: &Actor,
        host: &Name,
        container: &Name,
        log: &Name,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Read a container's named log.
    async fn read_log(&self, host: &Name, container: &Name, log: &Name) -> Result<Vec<u8>>;

    // =========================================================================
    // Queue
    // =========================================================================

    /// Queue a container request on behalf of an approved user.
    async fn submit_request(&self, actor: &Actor, props: Props) -> Result<Name>;

    /// List queued request names, oldest first.
    async fn list_requests(&self) -> Result<Vec<Name>>;

    // =========================================================================
    // Users and shared storage
    // =========================================================================

    /// Create a user with a freshly generated API key.
    ///
    /// The very first user needs no credentials and becomes an approved
    /// admin. After that only admins may create users.
    async fn create_user(&self, actor: &Actor, props: Props) -> Result<CreatedUser>;

    /// List user names. Admin only.
    async fn list_users(&self, actor: &Actor) -> Result<Vec<Name>>;

    /// Add a reusable init script to a user.
    async fn create_user_init_script(&self, actor: &Actor, user: &Name, props: Props)
        -> Result<Name>;

    /// List a user's init scripts.
    async fn list_user_init_scripts(&self, actor: &Actor, user: &Name) -> Result<Vec<InitScript>>;

    /// Define a shared storage. Admin only.
    async fn create_shared_storage(&self, actor: &Actor, props: Props) -> Result<Name>;

    /// List shared storage definitions.
    async fn list_shared_storage(&self) -> Result<Vec<SharedStorage>>;
}

/// The main control plane service implementation.
pub struct ControlPlaneService<S: Store> {
    store: Arc<S>,
    scheduler: Arc<dyn Scheduler>,
    config: ControlConfig,
    last_stamp: AtomicI64,
}

impl<S: Store + 'static> ControlPlaneService<S> {
    /// Create a new control plane service.
    #[must_use]
    pub fn new(store: Arc<S>, scheduler: Arc<dyn Scheduler>, config: ControlConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Create with a placement scheduler over the same store and default
    /// configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        let scheduler = PlacementScheduler::new(Arc::clone(&store), SchedulerConfig::default());
        Self::new(store, Arc::new(scheduler), ControlConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Microseconds since the epoch, strictly increasing across calls so
    /// that queue order matches submission order.
    fn request_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let last = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(last + 1)
    }

    /// Run a blocking store operation off the async runtime.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ControlError::Internal(format!("store task failed: {e}")))?
    }
}

/// Allow the operation, or fail with 401 for anonymous callers and 403 for
/// everyone else.
fn require(actor: &Actor, allowed: bool, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else if *actor == Actor::Anonymous {
        Err(AuthError::MissingCredentials.into())
    } else {
        Err(ControlError::Forbidden(format!("not allowed to {action}")))
    }
}

/// Replace a store `NotFound` with a more specific error.
fn or_missing(err: StoreError, missing: impl FnOnce() -> ControlError) -> ControlError {
    if err.is_not_found() {
        missing()
    } else {
        err.into()
    }
}

fn sorted(names: corral_store::Names) -> Vec<Name> {
    let mut names: Vec<Name> = names.collect();
    names.sort();
    names
}

fn string_field<'a>(props: &'a Props, key: &str) -> Option<&'a str> {
    props.get(key).and_then(Value::as_str)
}

/// Check that every inline mount names an existing shared storage.
fn check_mounts<S: Store>(store: &S, props: &Props) -> Result<()> {
    let Some(Value::Array(mounts)) = props.get("mounts") else {
        return Ok(());
    };
    for mount in mounts {
        let Some(storage) = mount.get("storage").and_then(Value::as_str) else {
            continue;
        };
        let exists = Name::parse(storage)
            .is_ok_and(|name| store.exists(&layout::shared_storage(), &name));
        if !exists {
            return Err(ControlError::Validation(format!(
                "unknown shared storage: {storage}"
            )));
        }
    }
    Ok(())
}

fn read_children<S: Store, M: corral_store::Model>(
    store: &S,
    collection: &corral_store::Collection<M>,
) -> Result<Vec<M>> {
    let mut records = Vec::new();
    for name in store.list(collection, None)? {
        match store.get(collection, &name) {
            Ok(record) => records.push(record),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}

fn load_container<S: Store>(store: &S, host: &Name, name: &Name) -> Result<ContainerView> {
    let container: Container = store.get(&layout::containers(host), name)?;
    let initscripts = read_children(store, &layout::container_init_scripts(host, name))?;
    let mounts: Vec<Mount> = read_children(store, &layout::container_mounts(host, name))?;
    let mounts = mounts
        .into_iter()
        .map(|mount| {
            let storage = Name::parse(&mount.storage)
                .ok()
                .and_then(|s| store.get(&layout::shared_storage(), &s).ok());
            MountView::resolve(mount, storage.as_ref())
        })
        .collect();
    Ok(ContainerView {
        container,
        initscripts,
        mounts,
    })
}

fn load_host<S: Store>(store: &S, name: &Name, with_containers: bool) -> Result<HostView> {
    let host: Host = store
        .get(&layout::hosts(), name)
        .map_err(|e| or_missing(e, || ControlError::HostNotFound(name.clone())))?;
    let last = store.last_heartbeat(name)?.map(|t| t.timestamp());
    let mut view = HostView::new(host, last);

    if with_containers {
        let mut containers = Vec::new();
        for container in store.list(&layout::containers(name), None)? {
            match load_container(store, name, &container) {
                Ok(c) => containers.push(c),
                Err(ControlError::Store(e)) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        view.containers = Some(containers);
    }
    Ok(view)
}

#[async_trait]
impl<S: Store + 'static> ControlPlane for ControlPlaneService<S> {
    // =========================================================================
    // Hosts
    // =========================================================================

    async fn list_hosts(&self, pattern: Option<String>) -> Result<Vec<Name>> {
        self.with_store(move |store| Ok(sorted(store.list(&layout::hosts(), pattern.as_deref())?)))
            .await
    }

    async fn register_host(&self, mut props: Props) -> Result<Name> {
        let name = take_name(&mut props, "host")?;
        props.insert(
            "enlisted".to_string(),
            Value::Bool(self.config.auto_enlist_hosts),
        );

        let created = name.clone();
        self.with_store(move |store| Ok(store.create(&layout::hosts(), &created, props)?))
            .await?;

        tracing::info!(host = %name, enlisted = self.config.auto_enlist_hosts, "Registered host");
        Ok(name)
    }

    async fn get_host(&self, actor: &Actor, name: &Name, with_containers: bool) -> Result<HostView> {
        let heartbeat = actor.is_host(name);
        if heartbeat {
            let now = Utc::now();
            let host = name.clone();
            self.with_store(move |store| {
                store
                    .record_heartbeat(&host, now)
                    .map_err(|e| or_missing(e, || ControlError::HostNotFound(host.clone())))
            })
            .await?;

            let placement = self.scheduler.on_heartbeat(name, now).await?;
            tracing::debug!(host = %name, placement = ?placement, "Processed heartbeat");
        }

        let host = name.clone();
        let mut view = self
            .with_store(move |store| load_host(store, &host, with_containers))
            .await?;
        if heartbeat {
            view.client_version = Some(self.config.client_version.clone());
        }
        Ok(view)
    }

    async fn update_host(&self, actor: &Actor, name: &Name, props: Props) -> Result<HostView> {
        require(actor, actor.is_host(name) || actor.is_admin(), "update this host")?;
        if props.contains_key("enlisted") && !actor.is_admin() {
            return Err(ControlError::Forbidden(
                "'enlisted' is controlled by the server".to_string(),
            ));
        }

        let host = name.clone();
        let view = self
            .with_store(move |store| {
                store
                    .update(&layout::hosts(), &host, props)
                    .map_err(|e| or_missing(e, || ControlError::HostNotFound(host.clone())))?;
                load_host(store, &host, false)
            })
            .await?;

        tracing::debug!(host = %name, "Updated host");
        Ok(view)
    }

    async fn delete_host(&self, actor: &Actor, name: &Name) -> Result<()> {
        require(actor, actor.is_host(name) || actor.is_admin(), "delete this host")?;

        let host = name.clone();
        self.with_store(move |store| {
            store
                .delete(&layout::hosts(), &host)
                .map_err(|e| or_missing(e, || ControlError::HostNotFound(host.clone())))
        })
        .await?;

        tracing::info!(host = %name, "Deleted host");
        Ok(())
    }

    // =========================================================================
    // Containers
    // =========================================================================

    async fn list_containers(&self, host: &Name) -> Result<Vec<Name>> {
        let host = host.clone();
        self.with_store(move |store| {
            if !store.exists(&layout::hosts(), &host) {
                return Err(ControlError::HostNotFound(host));
            }
            Ok(sorted(store.list(&layout::containers(&host), None)?))
        })
        .await
    }

    async fn get_container(&self, host: &Name, container: &Name) -> Result<ContainerView> {
        let (host, container) = (host.clone(), container.clone());
        self.with_store(move |store| {
            load_container(store, &host, &container).map_err(|e| match e {
                ControlError::Store(e) if e.is_not_found() => {
                    ControlError::ContainerNotFound { host, container }
                }
                e => e,
            })
        })
        .await
    }

    async fn create_container(&self, actor: &Actor, host: &Name, mut props: Props) -> Result<Name> {
        let user = actor.user().filter(|p| p.approved);
        require(actor, user.is_some(), "create containers")?;
        let requested_by = user.map(|p| p.name.to_string()).unwrap_or_default();

        self.config
            .container_types
            .validate(string_field(&props, "template"), string_field(&props, "release"))
            .map_err(ControlError::Validation)?;
        let name = take_name(&mut props, "container")?;
        props.insert("date_requested".to_string(), self.request_stamp().into());
        props.insert("requested_by".to_string(), requested_by.clone().into());

        let (host_name, created) = (host.clone(), name.clone());
        self.with_store(move |store| {
            check_mounts(store, &props)?;
            store
                .create(&layout::containers(&host_name), &created, props)
                .map_err(|e| or_missing(e, || ControlError::HostNotFound(host_name.clone())))
        })
        .await?;

        tracing::info!(host = %host, container = %name, user = %requested_by, "Assigned container directly");
        Ok(name)
    }

    async fn update_container(
        &self,
        actor: &Actor,
        host: &Name,
        container: &Name,
        mut props: Props,
    ) -> Result<ContainerUpdate> {
        require(actor, actor.is_host(host) || actor.is_admin(), "update this container")?;

        let (host_name, name) = (host.clone(), container.clone());
        let outcome = self
            .with_store(move |store| {
                let collection = layout::containers(&host_name);
                let missing = || ControlError::ContainerNotFound {
                    host: host_name.clone(),
                    container: name.clone(),
                };
                let current: Container = store
                    .get(&collection, &name)
                    .map_err(|e| or_missing(e, missing))?;

                if lifecycle::should_destroy(&current, &props) {
                    store
                        .delete(&collection, &name)
                        .map_err(|e| or_missing(e, missing))?;
                    return Ok(ContainerUpdate::Destroyed);
                }

                if let Some(to) = lifecycle::requested_state(&props) {
                    if !lifecycle::is_valid_transition(&current.state, &to) {
                        tracing::warn!(
                            host = %host_name,
                            container = %name,
                            from = %current.state,
                            to = %to,
                            "Unexpected container state transition"
                        );
                    }
                }
                lifecycle::acknowledge_recreate(&current, &mut props);

                let updated = store
                    .update(&collection, &name, props)
                    .map_err(|e| or_missing(e, missing))?;
                Ok(ContainerUpdate::Updated(updated))
            })
            .await?;

        if matches!(outcome, ContainerUpdate::Destroyed) {
            tracing::info!(host = %host, container = %container, "Destroyed one-shot container");
        }
        Ok(outcome)
    }

    async fn delete_container(&self, actor: &Actor, host: &Name, container: &Name) -> Result<()> {
        require(actor, actor.is_host(host) || actor.is_admin(), "delete this container")?;

        let (host_name, name) = (host.clone(), container.clone());
        self.with_store(move |store| {
            store
                .delete(&layout::containers(&host_name), &name)
                .map_err(|e| {
                    or_missing(e, || ControlError::ContainerNotFound {
                        host: host_name.clone(),
                        container: name.clone(),
                    })
                })
        })
        .await?;

        tracing::info!(host = %host, container = %container, "Deleted container");
        Ok(())
    }

    async fn append_log(
        &self,
        actor: &Actor,
        host: &Name,
        container: &Name,
        log: &Name,
        data: Vec<u8>,
    ) -> Result<()> {
        require(actor, actor.is_host(host), "write logs for this host")?;

        let (host, container, log) = (host.clone(), container.clone(), log.clone());
        self.with_store(move |store| {
            store
                .append_log(&host, &container, &log, &data)
                .map_err(|e| or_missing(e, || ControlError::ContainerNotFound { host, container }))
        })
        .await
    }

    async fn read_log(&self, host: &Name, container: &Name, log: &Name) -> Result<Vec<u8>> {
        let (host, container, log) = (host.clone(), container.clone(), log.clone());
        self.with_store(move |store| Ok(store.read_log(&host, &container, &log)?))
            .await
    }

    // =========================================================================
    // Queue
    // =========================================================================

    async fn submit_request(&self, actor: &Actor, mut props: Props) -> Result<Name> {
        let user = actor.user().filter(|p| p.approved);
        require(actor, user.is_some(), "submit container requests")?;
        let requested_by = user.map(|p| p.name.to_string()).unwrap_or_default();

        self.config
            .container_types
            .validate(string_field(&props, "template"), string_field(&props, "release"))
            .map_err(ControlError::Validation)?;
        let name = take_name(&mut props, "container request")?;
        props.insert("date_requested".to_string(), self.request_stamp().into());
        props.insert("requested_by".to_string(), requested_by.clone().into());

        let created = name.clone();
        self.with_store(move |store| {
            check_mounts(store, &props)?;
            Ok(store.create(&layout::container_requests(), &created, props)?)
        })
        .await?;

        tracing::info!(request = %name, user = %requested_by, "Queued container request");
        Ok(name)
    }

    async fn list_requests(&self) -> Result<Vec<Name>> {
        let mut requests: Vec<ContainerRequest> = self
            .with_store(|store| read_children(store, &layout::container_requests()))
            .await?;
        ranking::queue_order(&mut requests);
        Ok(requests.into_iter().map(|r| r.name).collect())
    }

    // =========================================================================
    // Users and shared storage
    // =========================================================================

    async fn create_user(&self, actor: &Actor, mut props: Props) -> Result<CreatedUser> {
        let name = take_name(&mut props, "user")?;
        props.remove("api_key");
        let api_key = secret::generate_secret();
        let actor = actor.clone();
        let auto_approve = self.config.auto_approve_users;

        let created = name.clone();
        let key = api_key.clone();
        let (approved, admin) = self
            .with_store(move |store| {
                let collection = layout::users();
                // The emptiness check and the create must not interleave with
                // another bootstrap, or two callers could both become admin.
                let created_user = store.with_collection_lock(&collection, || {
                    let first = store.list(&collection, None)?.next().is_none();
                    if first {
                        props.insert("approved".to_string(), Value::Bool(true));
                        props.insert("admin".to_string(), Value::Bool(true));
                    } else if actor.is_admin() {
                        props
                            .entry("approved")
                            .or_insert(Value::Bool(auto_approve));
                    } else {
                        return Ok(false);
                    }
                    props.insert("api_key".to_string(), Value::String(key));
                    store.create(&collection, &created, props)?;
                    Ok(true)
                })?;
                require(&actor, created_user, "create users")?;
                let user = store.get(&collection, &created)?;
                Ok((user.approved, user.admin))
            })
            .await?;

        tracing::info!(user = %name, approved, admin, "Created user");
        Ok(CreatedUser {
            name,
            approved,
            admin,
            api_key,
        })
    }

    async fn list_users(&self, actor: &Actor) -> Result<Vec<Name>> {
        require(actor, actor.is_admin(), "list users")?;
        self.with_store(|store| Ok(sorted(store.list(&layout::users(), None)?)))
            .await
    }

    async fn create_user_init_script(
        &self,
        actor: &Actor,
        user: &Name,
        mut props: Props,
    ) -> Result<Name> {
        let own = actor.user().is_some_and(|p| p.name == *user);
        require(actor, own || actor.is_admin(), "manage this user's init scripts")?;

        let name = take_name(&mut props, "init script")?;
        let (user_name, created) = (user.clone(), name.clone());
        self.with_store(move |store| {
            store
                .create(&layout::user_init_scripts(&user_name), &created, props)
                .map_err(|e| or_missing(e, || ControlError::UserNotFound(user_name.clone())))
        })
        .await?;

        tracing::debug!(user = %user, script = %name, "Created init script");
        Ok(name)
    }

    async fn list_user_init_scripts(&self, actor: &Actor, user: &Name) -> Result<Vec<InitScript>> {
        let own = actor.user().is_some_and(|p| p.name == *user);
        require(actor, own || actor.is_admin(), "read this user's init scripts")?;

        let user = user.clone();
        self.with_store(move |store| {
            if !store.exists(&layout::users(), &user) {
                return Err(ControlError::UserNotFound(user));
            }
            read_children(store, &layout::user_init_scripts(&user))
        })
        .await
    }

    async fn create_shared_storage(&self, actor: &Actor, mut props: Props) -> Result<Name> {
        require(actor, actor.is_admin(), "define shared storage")?;

        let name = take_name(&mut props, "shared storage")?;
        let created = name.clone();
        self.with_store(move |store| Ok(store.create(&layout::shared_storage(), &created, props)?))
            .await?;

        tracing::info!(storage = %name, "Created shared storage");
        Ok(name)
    }

    async fn list_shared_storage(&self) -> Result<Vec<SharedStorage>> {
        self.with_store(|store| read_children(store, &layout::shared_storage()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_auth::Principal;
    use corral_core::ContainerState;
    use corral_scheduler::MockScheduler;
    use corral_store::FsStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn props(value: Value) -> Props {
        value.as_object().unwrap().clone()
    }

    fn setup() -> (ControlPlaneService<FsStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsStore::open(dir.path()).unwrap());
        (ControlPlaneService::with_defaults(store), dir)
    }

    fn host_props(host: &str) -> Props {
        props(json!({
            "name": host,
            "distro_id": "ubuntu", "distro_release": "14.04", "distro_codename": "trusty",
            "mem_total": 8_000_000_000_u64, "cpu_total": 4, "cpu_type": "x86_64",
            "api_key": "K"
        }))
    }

    fn user(user: &str, approved: bool, admin: bool) -> Actor {
        Actor::User(Principal {
            name: name(user),
            approved,
            admin,
        })
    }

    fn request(req: &str) -> Props {
        props(json!({"name": req, "template": "ubuntu-cloud", "release": "trusty"}))
    }

    #[tokio::test]
    async fn register_applies_enlist_policy() {
        let (service, _dir) = setup();

        let mut body = host_props("H");
        body.insert("enlisted".into(), Value::Bool(false));
        service.register_host(body).await.unwrap();

        let view = service
            .get_host(&Actor::Anonymous, &name("H"), false)
            .await
            .unwrap();
        assert!(view.enlisted);
        assert!(view.client_version.is_none());
        assert!(view.containers.is_none());

        let dup = service.register_host(host_props("H")).await.unwrap_err();
        assert_eq!(dup.http_status_code(), 409);
    }

    #[tokio::test]
    async fn host_heartbeat_schedules_queued_request() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        service
            .submit_request(&user("alice", true, false), request("C"))
            .await
            .unwrap();
        assert_eq!(service.list_requests().await.unwrap(), vec![name("C")]);

        let view = service
            .get_host(&Actor::Host(name("H")), &name("H"), true)
            .await
            .unwrap();
        assert!(view.last_heartbeat.is_some());
        assert_eq!(view.client_version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        let containers = view.containers.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].container.name, name("C"));
        assert_eq!(containers[0].container.state, ContainerState::Unknown);
        assert_eq!(containers[0].container.requested_by.as_deref(), Some("alice"));
        assert!(service.list_requests().await.unwrap().is_empty());

        let update = service
            .update_container(
                &Actor::Host(name("H")),
                &name("H"),
                &name("C"),
                props(json!({"state": "RUNNING"})),
            )
            .await
            .unwrap();
        assert!(matches!(update, ContainerUpdate::Updated(c) if c.state.is_running()));

        let c = service.get_container(&name("H"), &name("C")).await.unwrap();
        assert_eq!(c.container.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn anonymous_get_does_not_heartbeat() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsStore::open(dir.path()).unwrap());
        let scheduler = Arc::new(MockScheduler::new());
        let service = ControlPlaneService::new(
            store,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            ControlConfig::default(),
        );
        service.register_host(host_props("H")).await.unwrap();

        let view = service
            .get_host(&Actor::Anonymous, &name("H"), true)
            .await
            .unwrap();
        assert!(view.last_heartbeat.is_none());
        assert!(scheduler.heartbeats().is_empty());

        service
            .get_host(&Actor::Host(name("H")), &name("H"), false)
            .await
            .unwrap();
        assert_eq!(scheduler.heartbeats(), vec![name("H")]);
    }

    #[tokio::test]
    async fn host_cannot_change_enlisted() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        let host = Actor::Host(name("H"));

        let err = service
            .update_host(&host, &name("H"), props(json!({"enlisted": false})))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);

        let view = service
            .update_host(&host, &name("H"), props(json!({"cpu_total": 8})))
            .await
            .unwrap();
        assert_eq!(view.cpu_total, 8);

        let err = service
            .update_host(&Actor::Anonymous, &name("H"), props(json!({"cpu_total": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 401);

        let other = Actor::Host(name("other"));
        let err = service
            .update_host(&other, &name("H"), props(json!({"cpu_total": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);
    }

    #[tokio::test]
    async fn delete_host_cascades() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        service
            .create_container(&user("alice", true, false), &name("H"), request("c1"))
            .await
            .unwrap();

        service
            .delete_host(&user("root", true, true), &name("H"))
            .await
            .unwrap();
        let err = service.list_containers(&name("H")).await.unwrap_err();
        assert!(matches!(err, ControlError::HostNotFound(_)));
    }

    #[tokio::test]
    async fn request_validation() {
        let (service, _dir) = setup();
        let alice = user("alice", true, false);

        let bad = props(json!({"name": "x", "template": "debian", "release": "trusty"}));
        let err = service.submit_request(&alice, bad).await.unwrap_err();
        assert_eq!(err.http_status_code(), 400);

        let unknown = props(json!({"name": "x", "template": "debian", "release": "jessie",
            "flavour": "spicy"}));
        let err = service.submit_request(&alice, unknown).await.unwrap_err();
        assert_eq!(err.http_status_code(), 400);

        let mount = props(json!({"name": "x", "template": "debian", "release": "jessie",
            "mounts": [{"name": "data", "storage": "nfs1", "directory": "/data"}]}));
        let err = service.submit_request(&alice, mount).await.unwrap_err();
        assert_eq!(err.http_status_code(), 400);

        let err = service
            .submit_request(&user("bob", false, false), request("x"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);

        let err = service
            .submit_request(&Actor::Anonymous, request("x"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 401);
    }

    #[tokio::test]
    async fn one_shot_destroy_deletes_container() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        let mut body = request("job");
        body.insert("one_shot".into(), Value::Bool(true));
        service
            .create_container(&user("alice", true, false), &name("H"), body)
            .await
            .unwrap();

        let outcome = service
            .update_container(
                &Actor::Host(name("H")),
                &name("H"),
                &name("job"),
                props(json!({"state": "DESTROY"})),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ContainerUpdate::Destroyed));
        assert!(service.list_containers(&name("H")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unexpected_transition_is_still_applied() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        service
            .create_container(&user("alice", true, false), &name("H"), request("c"))
            .await
            .unwrap();
        let host = Actor::Host(name("H"));

        service
            .update_container(&host, &name("H"), &name("c"), props(json!({"state": "RUNNING"})))
            .await
            .unwrap();
        assert!(!lifecycle::is_valid_transition(&ContainerState::Running, &ContainerState::Unknown));
        let outcome = service
            .update_container(&host, &name("H"), &name("c"), props(json!({"state": "UNKNOWN"})))
            .await
            .unwrap();
        let ContainerUpdate::Updated(c) = outcome else {
            panic!("expected update");
        };
        assert_eq!(c.state, ContainerState::Unknown);
    }

    #[tokio::test]
    async fn recreate_is_acknowledged_by_newer_date_created() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        service
            .create_container(&user("alice", true, false), &name("H"), request("c"))
            .await
            .unwrap();
        let host = Actor::Host(name("H"));
        let admin = user("root", true, true);

        service
            .update_container(&host, &name("H"), &name("c"), props(json!({"date_created": 100})))
            .await
            .unwrap();
        service
            .update_container(&admin, &name("H"), &name("c"), props(json!({"re_create": true})))
            .await
            .unwrap();

        let outcome = service
            .update_container(&host, &name("H"), &name("c"), props(json!({"date_created": 200})))
            .await
            .unwrap();
        let ContainerUpdate::Updated(c) = outcome else {
            panic!("expected update");
        };
        assert!(!c.re_create);
        assert_eq!(c.date_created, Some(200));
    }

    #[tokio::test]
    async fn logs_append_and_read() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        service
            .create_container(&user("alice", true, false), &name("H"), request("c"))
            .await
            .unwrap();
        let host = Actor::Host(name("H"));

        service
            .append_log(&host, &name("H"), &name("c"), &name("init"), b"one\n".to_vec())
            .await
            .unwrap();
        service
            .append_log(&host, &name("H"), &name("c"), &name("init"), b"two\n".to_vec())
            .await
            .unwrap();
        let log = service
            .read_log(&name("H"), &name("c"), &name("init"))
            .await
            .unwrap();
        assert_eq!(log, b"one\ntwo\n");

        let err = service
            .append_log(&host, &name("H"), &name("nope"), &name("init"), b"x".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 404);
    }

    #[tokio::test]
    async fn first_user_bootstraps_admin() {
        let (service, _dir) = setup();

        let root = service
            .create_user(&Actor::Anonymous, props(json!({"name": "root", "nickname": "Root"})))
            .await
            .unwrap();
        assert!(root.approved && root.admin);
        assert_eq!(root.api_key.len(), 64);

        let err = service
            .create_user(&Actor::Anonymous, props(json!({"name": "eve", "nickname": "Eve"})))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 401);

        let alice = service
            .create_user(
                &user("root", true, true),
                props(json!({"name": "alice", "nickname": "Alice"})),
            )
            .await
            .unwrap();
        assert!(!alice.approved);
        assert!(!alice.admin);

        let users = service.list_users(&user("root", true, true)).await.unwrap();
        assert_eq!(users, vec![name("alice"), name("root")]);
        let err = service
            .list_users(&user("alice", false, false))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bootstrap_yields_one_admin() {
        let (service, _dir) = setup();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .create_user(&Actor::Anonymous, props(json!({"name": format!("user_{i}")})))
                        .await
                })
            })
            .collect();

        let mut admins = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(created) => {
                    assert!(created.admin);
                    admins += 1;
                }
                Err(e) => {
                    assert_eq!(e.http_status_code(), 401);
                    rejected += 1;
                }
            }
        }
        assert_eq!((admins, rejected), (1, 7));
        let users = service.list_users(&user("root", true, true)).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_places_oldest_request_first() {
        let (service, _dir) = setup();
        service.register_host(host_props("H")).await.unwrap();
        let alice = user("alice", true, false);
        for request_name in ["zz", "aa"] {
            service.submit_request(&alice, request(request_name)).await.unwrap();
        }

        let view = service
            .get_host(&Actor::Host(name("H")), &name("H"), true)
            .await
            .unwrap();
        let placed: Vec<_> = view
            .containers
            .unwrap()
            .into_iter()
            .map(|c| c.container.name)
            .collect();
        assert_eq!(placed, vec![name("zz")]);
        assert_eq!(service.list_requests().await.unwrap(), vec![name("aa")]);
    }

    #[tokio::test]
    async fn user_init_scripts_are_private() {
        let (service, _dir) = setup();
        service
            .create_user(&Actor::Anonymous, props(json!({"name": "root", "nickname": "Root"})))
            .await
            .unwrap();
        let root = user("root", true, true);

        service
            .create_user_init_script(
                &root,
                &name("root"),
                props(json!({"name": "setup", "content": "#!/bin/sh\necho hi\n"})),
            )
            .await
            .unwrap();
        let scripts = service
            .list_user_init_scripts(&root, &name("root"))
            .await
            .unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, name("setup"));

        let err = service
            .list_user_init_scripts(&user("mallory", true, false), &name("root"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);

        let err = service
            .list_user_init_scripts(&root, &name("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn mounts_resolve_shared_storage() {
        let (service, _dir) = setup();
        let root = user("root", true, true);
        service
            .create_shared_storage(
                &root,
                props(json!({"name": "nfs1", "type": "nfs", "source": "10.0.0.1:/export"})),
            )
            .await
            .unwrap();
        let err = service
            .create_shared_storage(
                &user("alice", true, false),
                props(json!({"name": "nfs2", "type": "nfs", "source": "x"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 403);
        assert_eq!(service.list_shared_storage().await.unwrap().len(), 1);

        service.register_host(host_props("H")).await.unwrap();
        let mut body = request("c");
        body.insert(
            "mounts".into(),
            json!([{"name": "data", "storage": "nfs1", "directory": "/data"}]),
        );
        service.create_container(&root, &name("H"), body).await.unwrap();

        let view = service
            .get_host(&Actor::Anonymous, &name("H"), true)
            .await
            .unwrap();
        let mounts = &view.containers.unwrap()[0].mounts;
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].kind.as_deref(), Some("nfs"));
        assert_eq!(mounts[0].source.as_deref(), Some("10.0.0.1:/export"));
    }

    #[tokio::test]
    async fn requests_listed_oldest_first() {
        let (service, _dir) = setup();
        let alice = user("alice", true, false);
        for request_name in ["zz", "mm", "aa"] {
            service.submit_request(&alice, request(request_name)).await.unwrap();
        }

        let listed = service.list_requests().await.unwrap();
        assert_eq!(listed, vec![name("zz"), name("mm"), name("aa")]);

        let err = service.submit_request(&alice, request("a")).await.unwrap_err();
        assert_eq!(err.http_status_code(), 409);
    }
}
