//! Core types and utilities for corral.
//!
//! This crate provides the foundational types used throughout the corral fleet:
//!
//! - **Names**: path-safe record names for hosts, containers, users and requests
//! - **Container state**: the agent-observed lifecycle states
//! - **Secrets**: salted hashing and constant-time verification of API keys
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use corral_core::{secret, ContainerState, Name};
//!
//! let host = Name::parse("host_1").unwrap();
//! assert_eq!(host.as_str(), "host_1");
//!
//! let stored = secret::hash_secret("12345");
//! assert!(secret::verify_secret("12345", &stored).unwrap());
//!
//! assert!("RUNNING".parse::<ContainerState>().unwrap().is_running());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod names;
pub mod secret;
pub mod state;

pub use error::{CoreError, Result};
pub use names::{Name, NameError};
pub use secret::SecretError;
pub use state::ContainerState;
