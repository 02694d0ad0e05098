//! Container and container log endpoints, scoped under a host.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use corral_auth::Authenticator;
use corral_control::{ContainerUpdate, ControlPlane};

use super::{name, names, object};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::GatewayState;

/// List a host's containers.
///
/// # Errors
///
/// Returns 404 if the host doesn't exist.
pub async fn list_containers<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Path(host): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let containers = state.control.list_containers(&name(&host)?).await?;
    Ok(Json(names("containers", containers)))
}

/// Create a container directly on a host.
///
/// # Errors
///
/// Returns 401/403 unless called by an approved user, 400 for an invalid
/// template or release.
pub async fn create_container<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path(host): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let host = name(&host)?;
    let container = state
        .control
        .create_container(&actor, &host, object(body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": container }))))
}

/// Get a container.
///
/// # Errors
///
/// Returns 404 if the host or container doesn't exist.
pub async fn get_container<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Path((host, container)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let view = state
        .control
        .get_container(&name(&host)?, &name(&container)?)
        .await?;
    Ok(Json(view))
}

/// Merge-update a container.
///
/// A one-shot container reporting `state: DESTROY` is deleted and the
/// response is `204 No Content`.
///
/// # Errors
///
/// Returns 401/403 unless called by the owning host or an admin.
pub async fn update_container<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path((host, container)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<axum::response::Response, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let outcome = state
        .control
        .update_container(&actor, &name(&host)?, &name(&container)?, object(body)?)
        .await?;
    Ok(match outcome {
        ContainerUpdate::Updated(container) => Json(container).into_response(),
        ContainerUpdate::Destroyed => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Delete a container.
///
/// # Errors
///
/// Returns 401/403 unless called by the owning host or an admin.
pub async fn delete_container<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path((host, container)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    state
        .control
        .delete_container(&actor, &name(&host)?, &name(&container)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Append the raw request body to a container log.
///
/// # Errors
///
/// Returns 401/403 unless called by the owning host, 404 for unknown
/// containers.
pub async fn append_log<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path((host, container, log)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    state
        .control
        .append_log(
            &actor,
            &name(&host)?,
            &name(&container)?,
            &name(&log)?,
            body.to_vec(),
        )
        .await?;
    Ok(StatusCode::CREATED)
}

/// Read a container log as plain text.
///
/// # Errors
///
/// Returns 404 if the log doesn't exist.
pub async fn read_log<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Path((host, container, log)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let data = state
        .control
        .read_log(&name(&host)?, &name(&container)?, &name(&log)?)
        .await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], data))
}
