//! Shared storage endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use super::object;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Define a shared storage.
///
/// # Errors
///
/// Returns 401/403 unless called by an admin, 409 if the name is taken.
pub async fn create_storage<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let storage = state
        .control
        .create_shared_storage(&actor, object(body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": storage }))))
}

/// List shared storage definitions.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_storage<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let storage = state.control.list_shared_storage().await?;
    Ok(Json(json!({ "shared_storage": storage })))
}
