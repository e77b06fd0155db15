//! Memory Methods
//!
//! memory.AddMemory, memory.SearchMemory, memory.GetContext, memory.Reindex

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use nodimus_core::{IndexStatus, Repository, DEFAULT_SEARCH_LIMIT};

use super::parse_params;
use crate::protocol::types::JsonRpcError;
use crate::worker::WorkerHandle;

/// Upper bound on `limit` for a single search
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct AddMemoryArgs {
    content: String,
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GetContextArgs {
    id: i64,
}

/// Store a memory; index failure after commit is reported, not raised
pub async fn execute_add(
    repo: &Arc<Repository>,
    worker: &WorkerHandle,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let args: AddMemoryArgs = parse_params(params)?;
    let added = repo.add_memory(&args.content, &args.entities)?;
    worker.request_graph_regeneration();

    let mut result = json!({
        "id": added.id,
        "indexed": added.index.is_indexed(),
    });
    if let IndexStatus::Pending { reason } = added.index {
        worker.request_index_retry();
        result["warning"] = json!(format!("Memory stored but not yet searchable: {}", reason));
    }
    Ok(result)
}

/// Ranked contents for `query`; an empty query matches nothing
pub async fn execute_search(
    repo: &Arc<Repository>,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let args: SearchArgs = parse_params(params)?;
    let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);

    let results = repo.search_with_limit(&args.query, limit)?;
    Ok(json!({ "results": results.contents() }))
}

/// Content of one memory plus the entities it mentions
pub async fn execute_get_context(
    repo: &Arc<Repository>,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let args: GetContextArgs = parse_params(params)?;

    let context = repo.get_memory(args.id)?;
    let entities = repo.get_memory_entities(args.id)?;
    Ok(json!({
        "context": context,
        "entities": entities,
    }))
}

/// Rebuild the search index from the relational store
pub async fn execute_reindex(repo: &Arc<Repository>) -> Result<Value, JsonRpcError> {
    let documents = repo.rebuild_index()?;
    info!(documents, "Reindex requested over JSON-RPC");
    Ok(json!({ "documents": documents }))
}
