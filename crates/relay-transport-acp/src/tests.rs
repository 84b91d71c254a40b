//! Integration tests driving `AcpSession` over an in-memory duplex pipe,
//! standing in for a provider subprocess's stdio.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::session::{AcpSession, SessionState};

fn parse_request(line: &str) -> (Value, String) {
    let v: Value = serde_json::from_str(line).unwrap();
    let id = v["id"].clone();
    let method = v["method"].as_str().unwrap().to_string();
    (id, method)
}

#[tokio::test]
async fn handshake_happy_path_orders_state_transitions() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    let session = AcpSession::from_io(BufReader::new(client_read), client_write);

    let (server_read, mut server_write) = tokio::io::split(server_stream);
    let mut server_read = BufReader::new(server_read);

    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let mut line = String::new();
            server_read.read_line(&mut line).await.unwrap();
            let (id, method) = parse_request(line.trim());
            let result = match method.as_str() {
                "initialize" => json!({ "protocolVersion": "1.0" }),
                "session/new" => json!({ "sessionId": "sess-1" }),
                other => panic!("unexpected method {other}"),
            };
            let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            server_write
                .write_all(format!("{response}\n").as_bytes())
                .await
                .unwrap();
        }
    });

    assert_eq!(session.state(), SessionState::Created);

    session.initialize("1.0", json!({})).await.unwrap();
    assert_eq!(session.state(), SessionState::Initialized);

    let session_id = session.session_new("kimi", "kimi-k2").await.unwrap();
    assert_eq!(session_id, "sess-1");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.session_id(), Some("sess-1".to_string()));

    server.await.unwrap();
}

#[tokio::test]
async fn unhandled_reverse_tool_call_gets_method_not_found() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    // No tool handlers are registered on this session.
    let session = AcpSession::from_io(BufReader::new(client_read), client_write);

    let (server_read, mut server_write) = tokio::io::split(server_stream);
    let mut server_read = BufReader::new(server_read);

    let request = json!({
        "jsonrpc": "2.0",
        "id": 17,
        "method": "fs/read_text_file",
        "params": { "path": "/tmp/example.txt" },
    });
    server_write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();

    let mut line = String::new();
    server_read.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();

    assert_eq!(response["id"], json!(17));
    assert_eq!(response["error"]["code"], json!(-32601));

    drop(session);
}

#[tokio::test]
async fn registered_handler_answers_reverse_tool_call() {
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl crate::session::ToolHandler for Echo {
        async fn handle(&self, _method: &str, params: Option<Value>) -> Result<Value, String> {
            Ok(params.unwrap_or(Value::Null))
        }
    }

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    let session = AcpSession::from_io(BufReader::new(client_read), client_write);
    session
        .register_tool_handler("fs/read_text_file", Arc::new(Echo))
        .await;

    let (server_read, mut server_write) = tokio::io::split(server_stream);
    let mut server_read = BufReader::new(server_read);

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "fs/read_text_file",
        "params": { "path": "/tmp/example.txt" },
    });
    server_write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();

    let mut line = String::new();
    server_read.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();

    assert_eq!(response["result"]["path"], json!("/tmp/example.txt"));
}

#[tokio::test]
async fn permission_request_defaults_to_deny_without_handler() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    let session = AcpSession::from_io(BufReader::new(client_read), client_write);

    let (server_read, mut server_write) = tokio::io::split(server_stream);
    let mut server_read = BufReader::new(server_read);

    let request = json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "permission/request",
        "params": { "action": "write file" },
    });
    server_write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();

    let mut line = String::new();
    server_read.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();

    assert_eq!(response["result"]["approved"], json!(false));

    drop(session);
}

#[tokio::test]
async fn cancel_on_idle_session_is_a_no_op() {
    let (client_stream, _server_stream) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_stream);
    let session = AcpSession::from_io(BufReader::new(client_read), client_write);

    // Never prompted, so state is `Created`, not `Prompting`; cancel must
    // return immediately without sending anything.
    session.cancel().await.unwrap();
}
