//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<C, V>
where
    C: ControlPlane,
    V: Authenticator,
{
    /// The control plane for host, container and user operations.
    pub control: Arc<C>,
    /// Verifies `Authorization: Token` credentials.
    pub authenticator: Arc<V>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<C, V> GatewayState<C, V>
where
    C: ControlPlane,
    V: Authenticator,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(control: Arc<C>, authenticator: Arc<V>, config: GatewayConfig) -> Self {
        Self {
            control,
            authenticator,
            config,
        }
    }
}

impl<C, V> Clone for GatewayState<C, V>
where
    C: ControlPlane,
    V: Authenticator,
{
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            authenticator: Arc::clone(&self.authenticator),
            config: self.config.clone(),
        }
    }
}
