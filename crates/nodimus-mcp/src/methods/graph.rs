//! Graph Methods
//!
//! memory.GetEntities, memory.GetRelationships, memory.AddRelationship

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use nodimus_core::Repository;

use super::parse_params;
use crate::protocol::types::JsonRpcError;
use crate::worker::WorkerHandle;

#[derive(Debug, Deserialize)]
struct AddRelationshipArgs {
    source_id: i64,
    target_id: i64,
    #[serde(rename = "type")]
    relationship_type: String,
}

pub async fn execute_get_entities(repo: &Arc<Repository>) -> Result<Value, JsonRpcError> {
    Ok(json!({ "entities": repo.get_entities()? }))
}

pub async fn execute_get_relationships(repo: &Arc<Repository>) -> Result<Value, JsonRpcError> {
    Ok(json!({ "relationships": repo.get_relationships()? }))
}

/// Unknown endpoint ids fail with the transaction error code
pub async fn execute_add_relationship(
    repo: &Arc<Repository>,
    worker: &WorkerHandle,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let args: AddRelationshipArgs = parse_params(params)?;

    if args.relationship_type.trim().is_empty() {
        return Err(JsonRpcError::invalid_params("type must not be empty"));
    }

    let id = repo.add_relationship(args.source_id, args.target_id, &args.relationship_type)?;
    worker.request_graph_regeneration();
    Ok(json!({ "id": id }))
}
