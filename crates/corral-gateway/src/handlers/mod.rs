//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the control API.

pub mod agent;
pub mod containers;
pub mod health;
pub mod hosts;
pub mod requests;
pub mod storage;
pub mod users;

use serde_json::Value;

use corral_control::Props;
use corral_core::Name;

use crate::error::ApiError;

/// Require a JSON object body.
pub(crate) fn object(body: Value) -> Result<Props, ApiError> {
    match body {
        Value::Object(props) => Ok(props),
        _ => Err(ApiError::BadRequest("expected a JSON object".to_string())),
    }
}

/// Parse a record name from a path segment.
pub(crate) fn name(segment: &str) -> Result<Name, ApiError> {
    Name::parse(segment).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `{"<key>": [name...]}`
pub(crate) fn names(key: &str, names: Vec<Name>) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(
        key.to_string(),
        Value::Array(names.into_iter().map(|n| Value::String(n.into_inner())).collect()),
    );
    Value::Object(body)
}
