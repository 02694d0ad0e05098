//! HTTP control API for the corral control plane.
//!
//! Host agents and users talk to the fleet through this crate. It handles:
//!
//! - `Authorization: Token` authentication for hosts and users
//! - JSON endpoints for hosts, containers, logs, the request queue, users
//!   and shared storage
//! - Serving the agent binary for self-updates
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Host agents / users (HTTP + JSON)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       corral-gateway                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Caller    │ │   Router    │ │     ApiError        │    │
//! │  │  extractor  │ │ + handlers  │ │     mapping         │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐              ┌──────────────┐
//!        │   Control    │              │    Auth      │
//!        │   plane      │              │   (tokens)   │
//!        └──────────────┘              └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use corral_auth::StoreAuthenticator;
//! use corral_control::ControlPlaneService;
//! use corral_gateway::{create_router, GatewayConfig, GatewayState};
//! use corral_store::FsStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsStore::open("/tmp/corral-db")?);
//! let control = Arc::new(ControlPlaneService::with_defaults(Arc::clone(&store)));
//! let authenticator = Arc::new(StoreAuthenticator::new(store));
//!
//! let state = GatewayState::new(control, authenticator, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

pub use auth::Caller;
