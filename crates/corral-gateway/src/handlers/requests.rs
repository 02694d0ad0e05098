//! Container request queue endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use super::{names, object};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Queue a container request.
///
/// The request is placed on a host by the scheduler later, so the response
/// is `202 Accepted`.
///
/// # Errors
///
/// Returns 401/403 unless called by an approved user, 400 for an unknown
/// template, release or shared storage, 409 if the name is taken.
pub async fn submit_request<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Caller(actor): Caller,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let request = state.control.submit_request(&actor, object(body)?).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "name": request }))))
}

/// List queued requests, oldest first.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_requests<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let requests = state.control.list_requests().await?;
    Ok(Json(names("container_requests", requests)))
}
