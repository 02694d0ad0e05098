//! Host agent for corral.
//!
//! The agent runs on every container host. Each cycle it fetches the host's
//! desired containers from the control API, converges the local container
//! runtime toward them and reports back what it observed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  fetch / report  ┌──────────────────────┐
//! │ Control API  │◀────────────────▶│        Agent         │
//! └──────────────┘                  │  plan ─▶ apply       │
//!        ▲                          │  init scripts        │
//!        │ logs                     │  log relay           │
//!        └──────────────────────────┤  self-update         │
//!                                   └──────────┬───────────┘
//!                                              ▼
//!                                   ┌──────────────────────┐
//!                                   │  ContainerRuntime    │
//!                                   │  (lxc)               │
//!                                   └──────────────────────┘
//! ```
//!
//! Planning is a pure function of the desired and observed containers, so
//! a converged host does nothing on later cycles.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod facts;
pub mod init;
pub mod logs;
pub mod plan;
pub mod runtime;
pub mod state;
pub mod types;
pub mod updater;

pub use agent::{Agent, CycleOutcome, CycleReport};
pub use client::{ClientError, ControlApi, HttpControlClient};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use runtime::{ContainerRuntime, LxcRuntime};
