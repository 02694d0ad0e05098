//! Authentication extractors.
//!
//! This module provides the `Caller` extractor that verifies the
//! `Authorization: Token <value>` header and identifies who is calling.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use corral_auth::{token, Authenticator};
use corral_control::{Actor, ControlPlane};
use corral_core::Name;

use crate::error::ApiError;
use crate::state::GatewayState;

/// The authenticated caller of a request.
///
/// No header yields `Actor::Anonymous`. A `name:secret` value is checked as
/// user credentials. A bare secret is checked against the host named in the
/// request path, so host tokens only work on that host's own routes. Any
/// header that is present but does not verify is rejected with 401.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

/// Parse the `host` path parameter, if the route has one.
async fn path_host<S: Send + Sync>(parts: &mut Parts, state: &S) -> Option<Name> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .ok()?;
    params.get("host").and_then(|h| Name::parse(h).ok())
}

impl<C, V> FromRequestParts<Arc<GatewayState<C, V>>> for Caller
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<GatewayState<C, V>>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let Some(header) = parts.headers.get(AUTHORIZATION) else {
                return Ok(Caller(Actor::Anonymous));
            };
            let header = header
                .to_str()
                .map_err(|_| ApiError::Unauthorized("authorization header is not text".into()))?
                .to_string();
            let value = token::token_value(Some(&header))?;

            if value.contains(':') {
                let credentials = token::user_credentials(Some(&header))?;
                let principal = state.authenticator.authenticate_user(&credentials).await?;
                return Ok(Caller(Actor::User(principal)));
            }

            let host = path_host(parts, state)
                .await
                .ok_or_else(|| ApiError::Unauthorized("host token used outside a host route".into()))?;
            let secret = token::host_secret(Some(&header))?;
            state.authenticator.authenticate_host(&host, &secret).await?;
            Ok(Caller(Actor::Host(host)))
        })
    }
}
