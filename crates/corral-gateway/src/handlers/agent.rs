//! Agent binary download, used by hosts to self-update.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Serve the configured agent binary.
///
/// # Errors
///
/// Returns 404 if no binary is configured and 500 if it cannot be read.
pub async fn download_agent<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let path = state
        .config
        .agent_binary
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("no agent binary is published".to_string()))?;

    let binary = tokio::fs::read(path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to read agent binary");
        ApiError::Internal("agent binary unavailable".to_string())
    })?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], binary))
}
