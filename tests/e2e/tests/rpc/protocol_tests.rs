//! JSON-RPC Protocol Tests
//!
//! Drive the server through the line-oriented transport, as a client
//! process would over stdio.

use std::sync::Arc;

use nodimus_core::GRAPH_FILE;
use nodimus_e2e_tests::TestDatabaseManager;
use nodimus_mcp::protocol::stdio::StdioTransport;
use nodimus_mcp::{BackgroundWorker, MemoryServer, ShutdownMode};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Send `requests` one per line and collect the response lines
async fn session(db: &TestDatabaseManager, requests: &[Value]) -> Vec<Value> {
    let worker = BackgroundWorker::spawn(Arc::clone(&db.repo), db.data_dir().join(GRAPH_FILE));
    let server = MemoryServer::new(Arc::clone(&db.repo), worker.handle());

    let mut input = String::new();
    for request in requests {
        input.push_str(&request.to_string());
        input.push('\n');
    }

    let mut output: Vec<u8> = Vec::new();
    StdioTransport::new()
        .run_with(&server, input.as_bytes(), &mut output, CancellationToken::new())
        .await
        .unwrap();

    drop(server);
    worker.shutdown(ShutdownMode::Drain).await;

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

#[tokio::test]
async fn test_full_session() {
    let db = TestDatabaseManager::new_temp();
    let responses = session(
        &db,
        &[
            request(
                1,
                "memory.AddMemory",
                json!({"content": "Paris is the capital of France", "entities": ["Paris", "France"]}),
            ),
            request(2, "memory.SearchMemory", json!({"query": "capital"})),
            request(3, "memory.GetContext", json!({"id": 1})),
            request(4, "memory.AddRelationship", json!({"source_id": 1, "target_id": 2, "type": "capital_of"})),
            request(5, "memory.GetRelationships", json!({})),
            request(6, "memory.Status", json!({})),
        ],
    )
    .await;

    assert_eq!(responses.len(), 6);
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], i as i64 + 1);
        assert!(response.get("error").is_none(), "{}", response);
    }

    assert_eq!(responses[0]["result"], json!({"id": 1, "indexed": true}));
    assert_eq!(responses[1]["result"]["results"], json!(["Paris is the capital of France"]));
    assert_eq!(responses[2]["result"]["context"], "Paris is the capital of France");
    assert_eq!(responses[3]["result"]["id"], 1);
    assert_eq!(responses[4]["result"]["relationships"][0]["type"], "capital_of");
    assert_eq!(responses[5]["result"]["memories"], 1);
    assert_eq!(responses[5]["result"]["entities"], 2);
}

#[tokio::test]
async fn test_graph_file_follows_writes() {
    let db = TestDatabaseManager::new_temp();
    session(
        &db,
        &[request(
            1,
            "memory.AddMemory",
            json!({"content": "Berlin is the capital of Germany", "entities": ["Berlin", "Germany"]}),
        )],
    )
    .await;

    // Worker drained at shutdown, so the export reflects the write
    let doc: Value =
        serde_json::from_str(&std::fs::read_to_string(db.data_dir().join(GRAPH_FILE)).unwrap())
            .unwrap();
    let names: Vec<&str> = doc["@graph"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Berlin", "Germany"]);
}

#[tokio::test]
async fn test_errors_keep_the_session_alive() {
    let db = TestDatabaseManager::new_temp();
    let responses = session(
        &db,
        &[
            request(1, "memory.GetContext", json!({"id": 42})),
            request(2, "memory.Unknown", json!({})),
            request(3, "memory.AddMemory", json!({"entities": ["NoContent"]})),
            request(4, "ping", json!({})),
        ],
    )
    .await;

    assert_eq!(responses[0]["error"]["code"], -32002);
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[2]["error"]["code"], -32602);
    assert_eq!(responses[3]["result"], json!({}));
    assert!(db.is_empty());
}

#[tokio::test]
async fn test_malformed_line_then_valid_request() {
    let db = TestDatabaseManager::new_temp();
    let worker = BackgroundWorker::spawn(Arc::clone(&db.repo), db.data_dir().join(GRAPH_FILE));
    let server = MemoryServer::new(Arc::clone(&db.repo), worker.handle());

    let input = "{\"jsonrpc\": \"2.0\", \"id\": 1, \"method\"\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
    let mut output: Vec<u8> = Vec::new();
    StdioTransport::new()
        .run_with(&server, input.as_bytes(), &mut output, CancellationToken::new())
        .await
        .unwrap();
    worker.shutdown(ShutdownMode::Discard).await;

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["error"]["code"], -32700);
    assert_eq!(lines[0]["id"], Value::Null);
    assert_eq!(lines[1]["id"], 2);
}
