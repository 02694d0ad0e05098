//! Filesystem storage implementation.
//!
//! This module provides the `FsStore` implementation of the `Store` trait.
//! Every record is a directory; its fields live in `props.json`, which is
//! only ever replaced by writing a temporary file and renaming it into
//! place while the record's exclusive lock is held.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corral_core::Name;
use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::layout::{self, Collection, HEARTBEAT_FILE, LOCK_FILE, LOGS_DIR, PROPS_FILE};
use crate::lock::{LockMode, RecordLock};
use crate::pattern;
use crate::schema::{self, Props, Schema, Validated};
use crate::types::Model;
use crate::Store;

const REMOVE_ATTEMPTS: usize = 3;
const HEARTBEAT_TAIL_BYTES: u64 = 64;

/// Filesystem-backed storage implementation.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open or create a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the top-level collection directories cannot be
    /// created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in schema::top_level_dirs() {
            fs::create_dir_all(root.join(dir))
                .map_err(|e| StoreError::io("create collection", &e))?;
        }
        tracing::debug!(root = %root.display(), "Opened model store");
        Ok(Self { root })
    }

    /// Return the store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir<M: Model>(&self, collection: &Collection<M>) -> PathBuf {
        self.root.join(collection.relative_path())
    }

    fn record_dir<M: Model>(&self, collection: &Collection<M>, name: &Name) -> PathBuf {
        self.root.join(collection.record_path(name))
    }

    fn lock_record(
        record: &Path,
        mode: LockMode,
        kind: &'static str,
        name: &Name,
    ) -> Result<RecordLock> {
        RecordLock::acquire(&record.join(LOCK_FILE), mode).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::not_found(kind, name.as_str())
            } else {
                StoreError::io("lock record", &e)
            }
        })
    }

    fn require_record(record: &Path, kind: &'static str, name: &Name) -> Result<()> {
        if record.join(PROPS_FILE).is_file() {
            Ok(())
        } else {
            Err(StoreError::not_found(kind, name.as_str()))
        }
    }
}

// =============================================================================
// Record primitives
// =============================================================================

fn read_props(record: &Path, kind: &'static str, name: &str) -> Result<Props> {
    match fs::read(record.join(PROPS_FILE)) {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(kind, name)),
        Err(e) => Err(StoreError::io("read record", &e)),
    }
}

fn write_props(record: &Path, props: &Props) -> Result<()> {
    let mut tmp =
        NamedTempFile::new_in(record).map_err(|e| StoreError::io("create temp file", &e))?;
    serde_json::to_writer_pretty(&mut tmp, props)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    tmp.flush().map_err(|e| StoreError::io("flush record", &e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io("sync record", &e))?;
    tmp.persist(record.join(PROPS_FILE))
        .map_err(|e| StoreError::io("replace record", &e.error))?;
    Ok(())
}

fn remove_record(record: &Path) -> Result<()> {
    let mut last = None;
    for _ in 0..REMOVE_ATTEMPTS {
        match fs::remove_dir_all(record) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            // A concurrent reader may recreate the lock file mid-removal.
            Err(e) => last = Some(e),
        }
    }
    match last {
        Some(e) => Err(StoreError::io("remove record", &e)),
        None => Ok(()),
    }
}

/// Create `name` in `collection_dir` with all its inline children.
///
/// The record directory is created with `create_dir`, which fails if it
/// already exists, so concurrent creators race on a single syscall. Any
/// failure after that removes the whole record directory again.
fn create_tree(
    collection_dir: &Path,
    name: &Name,
    schema: &'static Schema,
    validated: &Validated,
) -> Result<()> {
    let record = collection_dir.join(name.as_str());
    match fs::create_dir(&record) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(StoreError::Conflict {
                kind: schema.kind,
                name: name.to_string(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::not_found(
                "collection",
                collection_dir.display().to_string(),
            ));
        }
        Err(e) => return Err(StoreError::io("create record", &e)),
    }

    let result = populate(&record, name, schema, validated);
    if result.is_err() {
        if let Err(e) = remove_record(&record) {
            tracing::warn!(record = %record.display(), error = %e, "Failed to roll back record");
        }
    }
    result
}

fn populate(
    record: &Path,
    name: &Name,
    schema: &'static Schema,
    validated: &Validated,
) -> Result<()> {
    let _lock = FsStore::lock_record(record, LockMode::Exclusive, schema.kind, name)?;

    for child in schema.children {
        fs::create_dir(record.join(child.key))
            .map_err(|e| StoreError::io("create child collection", &e))?;
    }
    for children in &validated.children {
        let dir = record.join(children.spec.key);
        for (child_name, child) in &children.records {
            create_tree(&dir, child_name, children.spec.schema, child)?;
        }
    }

    // Fields last, so a record is only visible once its children exist.
    write_props(record, &validated.fields)
}

/// Read a record together with its children in inline form.
fn read_tree(record: &Path, schema: &'static Schema, name: &Name) -> Result<Props> {
    let mut props = read_props(record, schema.kind, name.as_str())?;
    for child in schema.children {
        let mut items = Vec::new();
        for child_name in Names::in_dir(&record.join(child.key), None)? {
            let mut child_props =
                read_tree(&record.join(child.key).join(child_name.as_str()), child.schema, &child_name)?;
            child_props.insert("name".to_string(), child_name.to_string().into());
            items.push(serde_json::Value::Object(child_props));
        }
        if !items.is_empty() {
            props.insert(child.key.to_string(), serde_json::Value::Array(items));
        }
    }
    Ok(props)
}

fn merge(current: &mut Props, patch: Props) {
    for (key, value) in patch {
        if value.is_null() {
            current.remove(&key);
        } else {
            current.insert(key, value);
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Lazy iterator over the record names of a collection.
///
/// Entries that are not directories or not valid names (temporary files,
/// lock files) are skipped.
#[derive(Debug)]
pub struct Names {
    entries: Option<fs::ReadDir>,
    pattern: Option<String>,
}

impl Names {
    fn in_dir(dir: &Path, pattern: Option<&str>) -> Result<Self> {
        match fs::read_dir(dir) {
            Ok(entries) => Ok(Self {
                entries: Some(entries),
                pattern: pattern.map(str::to_string),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "Listing missing collection");
                Ok(Self::empty())
            }
            Err(e) => Err(StoreError::io("list collection", &e)),
        }
    }

    const fn empty() -> Self {
        Self {
            entries: None,
            pattern: None,
        }
    }
}

impl Iterator for Names {
    type Item = Name;

    fn next(&mut self) -> Option<Name> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().and_then(|s| Name::parse(s).ok())
            else {
                continue;
            };
            if let Some(p) = &self.pattern {
                if !pattern::matches(p, name.as_str()) {
                    continue;
                }
            }
            return Some(name);
        }
        None
    }
}

// =============================================================================
// Store
// =============================================================================

impl Store for FsStore {
    fn list<M: Model>(&self, collection: &Collection<M>, pattern: Option<&str>) -> Result<Names> {
        Names::in_dir(&self.collection_dir(collection), pattern)
    }

    fn get<M: Model>(&self, collection: &Collection<M>, name: &Name) -> Result<M> {
        let record = self.record_dir(collection, name);
        let _lock = Self::lock_record(&record, LockMode::Shared, collection.kind(), name)?;
        let props = read_props(&record, collection.kind(), name.as_str())?;
        M::decode(name, props)
    }

    fn exists<M: Model>(&self, collection: &Collection<M>, name: &Name) -> bool {
        self.record_dir(collection, name).join(PROPS_FILE).is_file()
    }

    fn create<M: Model>(&self, collection: &Collection<M>, name: &Name, props: Props) -> Result<()> {
        let validated = M::schema().validate_new(props)?;
        create_tree(&self.collection_dir(collection), name, M::schema(), &validated)?;
        tracing::debug!(kind = collection.kind(), name = %name, "Created record");
        Ok(())
    }

    fn update<M: Model>(&self, collection: &Collection<M>, name: &Name, props: Props) -> Result<M> {
        let patch = M::schema().validate_partial(props)?;
        let record = self.record_dir(collection, name);
        let _lock = Self::lock_record(&record, LockMode::Exclusive, collection.kind(), name)?;

        let mut current = read_props(&record, collection.kind(), name.as_str())?;
        merge(&mut current, patch);
        write_props(&record, &current)?;

        M::decode(name, current)
    }

    fn delete<M: Model>(&self, collection: &Collection<M>, name: &Name) -> Result<()> {
        let record = self.record_dir(collection, name);
        let _lock = Self::lock_record(&record, LockMode::Exclusive, collection.kind(), name)?;
        Self::require_record(&record, collection.kind(), name)?;
        remove_record(&record)?;
        tracing::debug!(kind = collection.kind(), name = %name, "Deleted record");
        Ok(())
    }

    fn move_record<A: Model, B: Model>(
        &self,
        from: &Collection<A>,
        to: &Collection<B>,
        name: &Name,
    ) -> Result<()> {
        let source = self.record_dir(from, name);
        let _lock = Self::lock_record(&source, LockMode::Exclusive, from.kind(), name)?;

        // Under the source lock: a concurrent mover that got here first has
        // already removed the record, and we fail with NotFound.
        let props = read_tree(&source, A::schema(), name)?;
        let validated = B::schema().validate_new(props)?;
        create_tree(&self.collection_dir(to), name, B::schema(), &validated)?;
        remove_record(&source)?;

        tracing::debug!(from = from.kind(), to = to.kind(), name = %name, "Moved record");
        Ok(())
    }

    fn with_collection_lock<M: Model, T>(
        &self,
        collection: &Collection<M>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io("create collection", &e))?;
        let _lock = RecordLock::acquire(&dir.join(LOCK_FILE), LockMode::Exclusive)
            .map_err(|e| StoreError::io("lock collection", &e))?;
        f()
    }

    fn record_heartbeat(&self, host: &Name, at: DateTime<Utc>) -> Result<()> {
        let record = self.record_dir(&layout::hosts(), host);
        Self::require_record(&record, "host", host)?;

        let path = record.join(HEARTBEAT_FILE);
        let _lock = RecordLock::acquire(&path, LockMode::Exclusive)
            .map_err(|e| StoreError::io("lock heartbeat log", &e))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io("open heartbeat log", &e))?;
        writeln!(file, "{}", at.timestamp()).map_err(|e| StoreError::io("append heartbeat", &e))
    }

    fn last_heartbeat(&self, host: &Name) -> Result<Option<DateTime<Utc>>> {
        let record = self.record_dir(&layout::hosts(), host);
        Self::require_record(&record, "host", host)?;

        let path = record.join(HEARTBEAT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let _lock = RecordLock::acquire(&path, LockMode::Shared)
            .map_err(|e| StoreError::io("lock heartbeat log", &e))?;

        let mut file = fs::File::open(&path).map_err(|e| StoreError::io("open heartbeat log", &e))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::io("stat heartbeat log", &e))?
            .len();
        file.seek(SeekFrom::Start(len.saturating_sub(HEARTBEAT_TAIL_BYTES)))
            .map_err(|e| StoreError::io("seek heartbeat log", &e))?;
        let mut tail = String::new();
        file.read_to_string(&mut tail)
            .map_err(|e| StoreError::io("read heartbeat log", &e))?;

        Ok(tail
            .lines()
            .rev()
            .find_map(|line| line.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    fn append_log(&self, host: &Name, container: &Name, log: &Name, data: &[u8]) -> Result<()> {
        let record = self.record_dir(&layout::containers(host), container);
        Self::require_record(&record, "container", container)?;

        let dir = record.join(LOGS_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io("create log directory", &e))?;
        let path = dir.join(log.as_str());
        let _lock = RecordLock::acquire(&path, LockMode::Exclusive)
            .map_err(|e| StoreError::io("lock log", &e))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io("open log", &e))?;
        file.write_all(data)
            .map_err(|e| StoreError::io("append log", &e))
    }

    fn read_log(&self, host: &Name, container: &Name, log: &Name) -> Result<Vec<u8>> {
        let record = self.record_dir(&layout::containers(host), container);
        Self::require_record(&record, "container", container)?;

        let path = record.join(LOGS_DIR).join(log.as_str());
        if !path.is_file() {
            return Err(StoreError::not_found("log", log.as_str()));
        }
        let _lock = RecordLock::acquire(&path, LockMode::Shared)
            .map_err(|e| StoreError::io("lock log", &e))?;
        fs::read(&path).map_err(|e| StoreError::io("read log", &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{container_init_scripts, container_requests, containers, hosts, users};
    use crate::types::{Container, ContainerRequest, Host, User};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Barrier};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (FsStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn host_props() -> Props {
        props(json!({
            "distro_id": "ubuntu",
            "distro_release": "14.12",
            "distro_codename": "TRSUY",
            "mem_total": 5,
            "cpu_total": 5,
            "cpu_type": "arm",
            "api_key": "12345"
        }))
    }

    #[test]
    fn create_then_get_returns_fields() {
        let (store, _dir) = create_test_store();
        store.create(&hosts(), &name("host_1"), host_props()).unwrap();

        let host: Host = store.get(&hosts(), &name("host_1")).unwrap();
        assert_eq!(host.distro_codename, "TRSUY");
        assert_eq!(host.mem_total, 5);
        assert_eq!(host.max_containers, 0);
        assert_ne!(host.api_key, "12345");
        assert!(corral_core::secret::verify_secret("12345", &host.api_key).unwrap());
    }

    #[test]
    fn duplicate_create_conflicts() {
        let (store, _dir) = create_test_store();
        store.create(&hosts(), &name("h"), host_props()).unwrap();
        let err = store.create(&hosts(), &name("h"), host_props()).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { kind: "host", .. }));
    }

    #[test]
    fn concurrent_creates_yield_one_success() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create(&hosts(), &name("racy"), host_props())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(StoreError::Conflict { .. })))
                .count(),
            7
        );
    }

    #[test]
    fn collection_lock_serializes_check_then_create() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.with_collection_lock(&users(), || {
                        if store.list(&users(), None)?.next().is_some() {
                            return Ok(false);
                        }
                        thread::sleep(Duration::from_millis(5));
                        let user = name(&format!("user_{i}"));
                        store.create(&users(), &user, props(json!({"nickname": "first"})))?;
                        Ok(true)
                    })
                })
            })
            .collect();

        let firsts = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(firsts, 1);
        assert_eq!(store.list(&users(), None).unwrap().count(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (store, _dir) = create_test_store();
        let err = store.get(&hosts(), &name("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_filters_by_pattern_and_tolerates_missing_collection() {
        let (store, _dir) = create_test_store();
        for h in ["web_1", "web_2", "db_1"] {
            store.create(&hosts(), &name(h), host_props()).unwrap();
        }

        let mut all: Vec<_> = store.list(&hosts(), None).unwrap().collect();
        all.sort();
        assert_eq!(all, vec![name("db_1"), name("web_1"), name("web_2")]);

        let web = store.list(&hosts(), Some("web_*")).unwrap().count();
        assert_eq!(web, 2);

        let missing = store.list(&containers(&name("ghost")), None).unwrap().count();
        assert_eq!(missing, 0);
    }

    #[test]
    fn update_merges_partially() {
        let (store, _dir) = create_test_store();
        store.create(&hosts(), &name("h"), host_props()).unwrap();

        let updated: Host = store
            .update(&hosts(), &name("h"), props(json!({"max_containers": 3})))
            .unwrap();
        assert_eq!(updated.max_containers, 3);
        assert_eq!(updated.cpu_type, "arm");

        let err = store
            .update::<Host>(&hosts(), &name("h"), props(json!({"mem_total": "lots"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store
            .update::<Host>(&hosts(), &name("missing"), props(json!({"max_containers": 1})))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn inline_children_are_created_and_deleted_with_parent() {
        let (store, _dir) = create_test_store();
        let mut p = host_props();
        p.insert(
            "containers".into(),
            json!([{"name": "c1", "template": "debian", "release": "jessie",
                    "initscripts": [{"name": "setup", "content": "echo hi"}]}]),
        );
        store.create(&hosts(), &name("h"), p).unwrap();

        let c: Container = store.get(&containers(&name("h")), &name("c1")).unwrap();
        assert_eq!(c.template.as_deref(), Some("debian"));
        let scripts: Vec<_> = store
            .list(&container_init_scripts(&name("h"), &name("c1")), None)
            .unwrap()
            .collect();
        assert_eq!(scripts, vec![name("setup")]);

        store.delete(&hosts(), &name("h")).unwrap();
        assert!(!store.exists(&hosts(), &name("h")));
        assert!(store.get(&containers(&name("h")), &name("c1")).is_err());
    }

    #[test]
    fn failed_child_rolls_back_parent() {
        let (store, dir) = create_test_store();
        let mut p = host_props();
        p.insert("containers".into(), json!([{"name": "c1", "bogus": 1}]));
        assert!(store.create(&hosts(), &name("h"), p).is_err());
        assert!(!dir.path().join("hosts/h").exists());
    }

    #[test]
    fn readers_never_observe_partial_writes() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let big = |c: char| c.to_string().repeat(64 * 1024);
        store
            .create(&users(), &name("alice"), props(json!({"nickname": big('a')})))
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..50 {
                    let c = if i % 2 == 0 { 'b' } else { 'a' };
                    store
                        .update::<User>(&users(), &name("alice"), props(json!({"nickname": big(c)})))
                        .unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let user: User = store.get(&users(), &name("alice")).unwrap();
                        assert_eq!(user.nickname.len(), 64 * 1024);
                        let first = user.nickname.chars().next().unwrap();
                        assert!(user.nickname.chars().all(|c| c == first));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn exclusive_holder_blocks_reader_until_release() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        store
            .create(&users(), &name("bob"), props(json!({"nickname": "old"})))
            .unwrap();
        let record = store.root().join("users/bob");

        let lock = RecordLock::acquire(&record.join(LOCK_FILE), LockMode::Exclusive).unwrap();

        let (tx, rx) = mpsc::channel();
        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let user: User = store.get(&users(), &name("bob")).unwrap();
                tx.send(user.nickname).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        let mut current = read_props(&record, "user", "bob").unwrap();
        current.insert("nickname".into(), json!("new"));
        write_props(&record, &current).unwrap();
        drop(lock);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "new");
        reader.join().unwrap();
    }

    #[test]
    fn move_record_creates_destination_then_removes_source() {
        let (store, _dir) = create_test_store();
        store.create(&hosts(), &name("h"), host_props()).unwrap();
        store
            .create(
                &container_requests(),
                &name("job"),
                props(json!({
                    "requested_by": "alice",
                    "template": "debian",
                    "release": "jessie",
                    "date_requested": 10,
                    "mounts": [{"name": "data", "storage": "nfs1", "directory": "/data"}]
                })),
            )
            .unwrap();

        store
            .move_record(&container_requests(), &containers(&name("h")), &name("job"))
            .unwrap();

        assert!(!store.exists(&container_requests(), &name("job")));
        let c: Container = store.get(&containers(&name("h")), &name("job")).unwrap();
        assert_eq!(c.requested_by.as_deref(), Some("alice"));
        assert_eq!(c.state, corral_core::ContainerState::Unknown);
        let mounts = store
            .list(&layout::container_mounts(&name("h"), &name("job")), None)
            .unwrap()
            .count();
        assert_eq!(mounts, 1);

        let again = store.move_record(&container_requests(), &containers(&name("h")), &name("job"));
        assert!(again.unwrap_err().is_not_found());
        let _ = store.get::<ContainerRequest>(&container_requests(), &name("job")).unwrap_err();
    }

    #[test]
    fn heartbeat_log_tracks_latest() {
        let (store, _dir) = create_test_store();
        store.create(&hosts(), &name("h"), host_props()).unwrap();
        assert_eq!(store.last_heartbeat(&name("h")).unwrap(), None);

        let first = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let second = DateTime::from_timestamp(1_700_000_060, 0).unwrap();
        store.record_heartbeat(&name("h"), first).unwrap();
        store.record_heartbeat(&name("h"), second).unwrap();
        assert_eq!(store.last_heartbeat(&name("h")).unwrap(), Some(second));

        assert!(store
            .record_heartbeat(&name("ghost"), second)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn container_logs_append() {
        let (store, _dir) = create_test_store();
        let mut p = host_props();
        p.insert("containers".into(), json!([{"name": "c1"}]));
        store.create(&hosts(), &name("h"), p).unwrap();

        store
            .append_log(&name("h"), &name("c1"), &name("init"), b"one\n")
            .unwrap();
        store
            .append_log(&name("h"), &name("c1"), &name("init"), b"two\n")
            .unwrap();
        assert_eq!(
            store.read_log(&name("h"), &name("c1"), &name("init")).unwrap(),
            b"one\ntwo\n"
        );

        assert!(store
            .append_log(&name("h"), &name("c2"), &name("init"), b"x")
            .unwrap_err()
            .is_not_found());
        assert!(store
            .read_log(&name("h"), &name("c1"), &name("console"))
            .unwrap_err()
            .is_not_found());
    }
}
