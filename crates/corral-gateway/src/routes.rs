//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use corral_auth::Authenticator;
use corral_control::ControlPlane;

use crate::handlers::{agent, containers, health, hosts, requests, storage, users};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// Everything except `/health` is mounted under `config.api_prefix`.
/// Path parameters are named `host`, `container`, `logname` and `user`;
/// the [`Caller`](crate::auth::Caller) extractor relies on `host`.
///
/// # Routes
///
/// ## Public
/// - `GET /health`
///
/// ## Hosts
/// - `GET|POST /host/`
/// - `GET|PATCH|DELETE /host/:host/`
/// - `GET|POST /host/:host/container/`
/// - `GET|PATCH|DELETE /host/:host/container/:container/`
/// - `GET|POST /host/:host/container/:container/logs/:logname`
///
/// ## Queue, users and storage
/// - `GET|POST /container_request/`
/// - `GET|POST /user/`
/// - `GET|POST /user/:user/initscript/`
/// - `GET|POST /shared_storage/`
/// - `GET /agent/download`
pub fn create_router<C, V>(state: GatewayState<C, V>) -> Router
where
    C: ControlPlane + 'static,
    V: Authenticator + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let timeout = state.config.request_timeout();
    let prefix = state.config.api_prefix.clone();

    let state = Arc::new(state);

    let api = Router::new()
        .route(
            "/host/",
            get(hosts::list_hosts::<C, V>).post(hosts::create_host::<C, V>),
        )
        .route(
            "/host/:host/",
            get(hosts::get_host::<C, V>)
                .patch(hosts::update_host::<C, V>)
                .delete(hosts::delete_host::<C, V>),
        )
        .route(
            "/host/:host/container/",
            get(containers::list_containers::<C, V>).post(containers::create_container::<C, V>),
        )
        .route(
            "/host/:host/container/:container/",
            get(containers::get_container::<C, V>)
                .patch(containers::update_container::<C, V>)
                .delete(containers::delete_container::<C, V>),
        )
        .route(
            "/host/:host/container/:container/logs/:logname",
            get(containers::read_log::<C, V>).post(containers::append_log::<C, V>),
        )
        .route(
            "/container_request/",
            get(requests::list_requests::<C, V>).post(requests::submit_request::<C, V>),
        )
        .route(
            "/user/",
            get(users::list_users::<C, V>).post(users::create_user::<C, V>),
        )
        .route(
            "/user/:user/initscript/",
            get(users::list_init_scripts::<C, V>).post(users::create_init_script::<C, V>),
        )
        .route(
            "/shared_storage/",
            get(storage::list_storage::<C, V>).post(storage::create_storage::<C, V>),
        )
        .route("/agent/download", get(agent::download_agent::<C, V>));

    Router::new()
        .route("/health", get(health::health))
        .nest(&prefix, api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layers_build() {
        let _any = build_cors_layer(&["*".to_string()]);
        let _listed = build_cors_layer(&[
            "http://localhost:3000".to_string(),
            "not a header\n".to_string(),
        ]);
    }
}
