//! User and user init script endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use super::{name, names, object};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Create a user.
///
/// The response carries the generated API key, which is never shown again.
///
/// # Errors
///
/// Returns 401/403 unless called by an admin (or this is the first user),
/// 409 if the name is taken.
pub async fn create_user<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let created = state.control.create_user(&actor, object(body)?).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List user names.
///
/// # Errors
///
/// Returns 401/403 unless called by an admin.
pub async fn list_users<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let users = state.control.list_users(&actor).await?;
    Ok(Json(names("users", users)))
}

/// Add an init script to a user.
///
/// # Errors
///
/// Returns 401/403 unless called by that user or an admin.
pub async fn create_init_script<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path(user): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let script = state
        .control
        .create_user_init_script(&actor, &name(&user)?, object(body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": script }))))
}

/// List a user's init scripts.
///
/// # Errors
///
/// Returns 401/403 unless called by that user or an admin.
pub async fn list_init_scripts<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let scripts = state
        .control
        .list_user_init_scripts(&actor, &name(&user)?)
        .await?;
    Ok(Json(json!({ "initscripts": scripts })))
}
