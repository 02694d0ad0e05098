//! Host endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{HOST, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use super::{name, names, object};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Query parameters for `GET /host/`.
#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    /// Shell-style name pattern.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// List host names.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_hosts<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let hosts = state.control.list_hosts(query.pattern).await?;
    Ok(Json(names("hosts", hosts)))
}

/// Register a host.
///
/// Responds `201 Created` with a `Location` header pointing at the new host.
///
/// # Errors
///
/// Returns 400 for invalid properties and 409 if the host exists.
pub async fn create_host<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let host = state.control.register_host(object(body)?).await?;

    let path = format!("{}/host/{host}/", state.config.api_prefix);
    let location = match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(authority) => format!("http://{authority}{path}"),
        None => path,
    };
    Ok((StatusCode::CREATED, [(LOCATION, location)]))
}

/// Get a host.
///
/// `?with_containers` includes the assigned containers. When the host
/// itself calls this, a heartbeat is recorded and the scheduler runs first.
///
/// # Errors
///
/// Returns 401 for a bad `Authorization` header and 404 for unknown hosts.
pub async fn get_host<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path(host): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let host = name(&host)?;
    let with_containers = query.contains_key("with_containers");
    let view = state.control.get_host(&actor, &host, with_containers).await?;
    Ok(Json(view))
}

/// Merge-update a host.
///
/// # Errors
///
/// Returns 401 without valid credentials and 403 when trying to change
/// `enlisted`.
pub async fn update_host<C, V>(
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
    let view = state.control.update_host(&actor, &host, object(body)?).await?;
    Ok(Json(view))
}

/// Delete a host and its containers.
///
/// # Errors
///
/// Returns 401 without valid credentials and 404 for unknown hosts.
pub async fn delete_host<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Path(host): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let host = name(&host)?;
    state.control.delete_host(&actor, &host).await?;
    Ok(StatusCode::NO_CONTENT)
}
