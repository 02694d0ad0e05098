//! File-backed model store for corral.
//!
//! This crate provides durable, schema-validated storage for hosts,
//! containers, container requests, users and shared storage definitions.
//!
//! # Architecture
//!
//! Each entity kind is a directory of independently lockable records; see
//! the [`layout`] module for the tree. Records are guarded by a per-record
//! shared/exclusive `flock` and rewritten by atomic rename, so operations on
//! different records never contend and readers never observe a partial
//! write.
//!
//! # Example
//!
//! ```no_run
//! use corral_core::Name;
//! use corral_store::{layout, FsStore, Host, Store};
//! use serde_json::json;
//!
//! let store = FsStore::open("/tmp/corral-db").unwrap();
//! let name = Name::parse("host_1").unwrap();
//!
//! let props = json!({
//!     "distro_id": "ubuntu", "distro_release": "14.04", "distro_codename": "trusty",
//!     "mem_total": 8_589_934_592_u64, "cpu_total": 4, "cpu_type": "x86_64",
//!     "api_key": "secret"
//! });
//! store.create(&layout::hosts(), &name, props.as_object().unwrap().clone()).unwrap();
//!
//! let host: Host = store.get(&layout::hosts(), &name).unwrap();
//! assert_ne!(host.api_key, "secret");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fs;
pub mod layout;
mod lock;
pub mod pattern;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use fs::{FsStore, Names};
pub use layout::Collection;
pub use schema::Props;
pub use types::{
    Container, ContainerRequest, Host, InitScript, Model, Mount, SharedStorage, User,
};

use chrono::{DateTime, Utc};
use corral_core::Name;

/// The storage trait defining all model store operations.
///
/// This trait abstracts the storage layer so that services and tests can be
/// written against any implementation.
pub trait Store: Send + Sync {
    // =========================================================================
    // Record Operations
    // =========================================================================

    /// List record names in a collection, optionally filtered by a
    /// shell-style pattern.
    ///
    /// The returned iterator reads the directory lazily. A missing
    /// collection yields nothing and is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection exists but cannot be read.
    fn list<M: Model>(&self, collection: &Collection<M>, pattern: Option<&str>) -> Result<Names>;

    /// Get a record by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the record doesn't exist.
    fn get<M: Model>(&self, collection: &Collection<M>, name: &Name) -> Result<M>;

    /// Returns true if the record exists.
    fn exists<M: Model>(&self, collection: &Collection<M>, name: &Name) -> bool;

    /// Create a record, with any inline children, from raw properties.
    ///
    /// Properties are validated against the kind's schema; defaults and
    /// secret hashing are applied before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the properties don't match the
    /// schema, `StoreError::Conflict` if the name is taken and
    /// `StoreError::NotFound` if the parent record doesn't exist.
    fn create<M: Model>(&self, collection: &Collection<M>, name: &Name, props: Props) -> Result<()>;

    /// Merge the given properties into an existing record.
    ///
    /// Fields not present are untouched; a `null` value removes the field.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for unknown or mistyped fields and
    /// `StoreError::NotFound` if the record doesn't exist.
    fn update<M: Model>(&self, collection: &Collection<M>, name: &Name, props: Props) -> Result<M>;

    /// Delete a record and all of its children.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the record doesn't exist.
    fn delete<M: Model>(&self, collection: &Collection<M>, name: &Name) -> Result<()>;

    /// Move a record, with its children, into another collection.
    ///
    /// The destination is created before the source is removed, all while
    /// the source's exclusive lock is held. Two concurrent moves of the same
    /// record therefore result in one success and one `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the source doesn't exist and
    /// `StoreError::Conflict` if the destination name is taken.
    fn move_record<A: Model, B: Model>(
        &self,
        from: &Collection<A>,
        to: &Collection<B>,
        name: &Name,
    ) -> Result<()>;

    /// Run `f` while holding an exclusive lock on a whole collection.
    ///
    /// Only callers that also take this lock are serialized with each other;
    /// record operations are not blocked by it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the lock cannot be taken, otherwise
    /// whatever `f` returns.
    fn with_collection_lock<M: Model, T>(
        &self,
        collection: &Collection<M>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T>;

    // =========================================================================
    // Append-only Logs
    // =========================================================================

    /// Append a heartbeat timestamp to a host's heartbeat log.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the host doesn't exist.
    fn record_heartbeat(&self, host: &Name, at: DateTime<Utc>) -> Result<()>;

    /// Return the most recent heartbeat of a host, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the host doesn't exist.
    fn last_heartbeat(&self, host: &Name) -> Result<Option<DateTime<Utc>>>;

    /// Append raw data to a container's named log.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the container doesn't exist.
    fn append_log(&self, host: &Name, container: &Name, log: &Name, data: &[u8]) -> Result<()>;

    /// Read the full contents of a container's named log.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the container or log doesn't exist.
    fn read_log(&self, host: &Name, container: &Name, log: &Name) -> Result<Vec<u8>>;
}
