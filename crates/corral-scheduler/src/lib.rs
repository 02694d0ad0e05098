//! Capacity-aware placement of queued container requests.
//!
//! This crate provides the [`Scheduler`] trait and [`PlacementScheduler`]
//! implementation. It handles:
//!
//! - Ranking live hosts by load and memory
//! - Honoring per-host `max_containers` caps
//! - Moving the oldest queued request onto the winning host
//!
//! There is no scheduling process or timer. The control plane invokes the
//! scheduler synchronously for each authenticated host heartbeat.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Control Plane (host heartbeat)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     PlacementScheduler                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────────┐    │
//! │  │  Capacity   │ │  Candidate  │ │    Ranking              │    │
//! │  │  check      │ │  set        │ │    (count, mem, name)   │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        Model store: container_requests/ ──move──▶ hosts/H/      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use corral_core::Name;
//! use corral_scheduler::{PlacementScheduler, Scheduler, SchedulerConfig};
//! use corral_store::FsStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsStore::open("/tmp/corral-db")?);
//! let scheduler = PlacementScheduler::new(store, SchedulerConfig::default());
//!
//! let placement = scheduler.on_heartbeat(&Name::parse("host_1")?, Utc::now()).await?;
//! println!("{placement:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use [`MockScheduler`], which records
//! heartbeats and replays canned outcomes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod placement;
pub mod ranking;
pub mod types;

pub use error::{Result, SchedulerError};
pub use placement::{PlacementScheduler, Scheduler};
pub use types::{HostLoad, Placement, SchedulerConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use placement::mock::MockScheduler;
