//! Memory Server
//!
//! Dispatches JSON-RPC requests to the repository.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use nodimus_core::Repository;

use crate::methods;
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::worker::WorkerHandle;

/// JSON-RPC front end over a shared repository
pub struct MemoryServer {
    repo: Arc<Repository>,
    worker: WorkerHandle,
}

impl MemoryServer {
    pub fn new(repo: Arc<Repository>, worker: WorkerHandle) -> Self {
        Self { repo, worker }
    }

    /// Handle one request; notifications produce no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        let result = if request.jsonrpc != JSONRPC_VERSION {
            Err(JsonRpcError::invalid_request("jsonrpc must be \"2.0\""))
        } else {
            self.dispatch(&request.method, request.params.clone()).await
        };

        if request.is_notification() {
            if let Err(e) = &result {
                debug!("Notification '{}' failed: {}", request.method, e);
            }
            return None;
        }

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "memory.AddMemory" => methods::memory::execute_add(&self.repo, &self.worker, params).await,
            "memory.SearchMemory" => methods::memory::execute_search(&self.repo, params).await,
            "memory.GetContext" => methods::memory::execute_get_context(&self.repo, params).await,
            "memory.Reindex" => methods::memory::execute_reindex(&self.repo).await,
            "memory.GetEntities" => methods::graph::execute_get_entities(&self.repo).await,
            "memory.GetRelationships" => methods::graph::execute_get_relationships(&self.repo).await,
            "memory.AddRelationship" => {
                methods::graph::execute_add_relationship(&self.repo, &self.worker, params).await
            }
            "memory.Status" => self.handle_status(),
            "ping" => Ok(json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        }
    }

    fn handle_status(&self) -> Result<Value, JsonRpcError> {
        let stats = self.repo.stats()?;
        Ok(json!({
            "version": nodimus_core::VERSION,
            "memories": stats.memories,
            "entities": stats.entities,
            "relationships": stats.relationships,
            "indexed_documents": stats.indexed_documents,
            "pending_index": stats.pending_index,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
