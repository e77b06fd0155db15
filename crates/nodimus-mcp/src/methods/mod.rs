//! Method Implementations
//!
//! One function per JSON-RPC method. Each takes the raw params and returns
//! the result object or a wire error.

pub mod graph;
pub mod memory;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::types::JsonRpcError;

/// Deserialize method params, treating absent params as `{}`
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(&format!("Invalid params: {}", e)))
}
