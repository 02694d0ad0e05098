//! Control plane for corral hosts, containers and users.
//!
//! This crate holds the policies that sit between the HTTP gateway and the
//! model store: who may do what, what the server decides on a client's
//! behalf, and when the scheduler runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/JSON)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ Actor + payload
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Hosts &    │ │  Queue &    │ │    Container        │    │
//! │  │  heartbeat  │ │  users      │ │    lifecycle        │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐              ┌─────────────┐
//!        │    Store     │◀─────────────│  Scheduler  │
//!        │ (file-based) │              │ (placement) │
//!        └──────────────┘              └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use corral_control::{Actor, ControlPlane, ControlPlaneService};
//! use corral_core::Name;
//! use corral_store::FsStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsStore::open("/tmp/corral-db")?);
//! let control = ControlPlaneService::with_defaults(store);
//!
//! // A host fetching its own record heartbeats and triggers placement.
//! let host = Name::parse("host_1")?;
//! let view = control.get_host(&Actor::Host(host.clone()), &host, true).await?;
//! println!("{} containers", view.containers.map_or(0, |c| c.len()));
//! # Ok(())
//! # }
//! ```
//!
//! # Policies
//!
//! - `enlisted` is set from configuration on registration and only admins
//!   may change it afterwards.
//! - The first user is created without credentials and becomes an admin.
//! - Requests must name a known `template`/`release` pair.
//! - A newer `date_created` clears `re_create`.
//! - A one-shot container reporting `DESTROY` is deleted.
//!
//! See the [`lifecycle`] module for the container state machine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lifecycle;
pub mod service;
pub mod types;

pub use error::{ControlError, Result};
pub use service::{ControlPlane, ControlPlaneService};
pub use types::{
    Actor, ContainerTypes, ContainerUpdate, ContainerView, ControlConfig, CreatedUser, HostView,
    MountView,
};

// Re-export commonly used types from dependencies for convenience
pub use corral_core::{ContainerState, Name};
pub use corral_store::{Container, InitScript, Props, SharedStorage};
