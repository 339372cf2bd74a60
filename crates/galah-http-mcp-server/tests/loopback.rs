//! Full round trip over a real TCP listener: `McpClient` with the
//! Streamable HTTP transport against `McpHttpServer`.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use galah_http_mcp_server::{HttpServerConfig, McpHttpServer, StreamableHttpService};
use galah_mcp_client::{McpClient, StreamableHttpTransport, ToolCallUpdate};
use galah_mcp_peer::transport::Transport;
use galah_mcp_protocol::{CallToolResult, ElicitAction, ElicitResult, TaskMetadata, Tool};
use galah_mcp_server::McpServer;

fn demo_server() -> galah_mcp_protocol::McpResult<McpServer> {
    let server = McpServer::builder("loopback", "1").build()?;
    server.register_tool(
        Tool::new(
            "echo",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
        ),
        |arguments, _context| async move {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(CallToolResult::text(message))
        },
    )?;
    server.register_tool(
        Tool::new("delete_file", json!({"type": "object"})),
        |arguments, context| async move {
            let name = arguments
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let outcome = context
                .elicit(
                    format!("Confirm delete '{}'?", name),
                    json!({
                        "type": "object",
                        "properties": {"confirm": {"type": "boolean"}},
                        "required": ["confirm"]
                    }),
                )
                .await?;
            if outcome.action == ElicitAction::Accept {
                Ok(CallToolResult::text(format!("Deleted '{}'", name)))
            } else {
                Ok(CallToolResult::text("Delete declined"))
            }
        },
    )?;
    Ok(server)
}

#[tokio::test]
async fn test_http_round_trip_with_task_elicitation() {
    let service = StreamableHttpService::new(demo_server, HttpServerConfig::new());
    let http_server = Arc::new(McpHttpServer::new(service));
    let shutdown = http_server.shutdown_handle();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    {
        let http_server = http_server.clone();
        tokio::spawn(async move { http_server.run(listener).await });
    }

    let endpoint = format!("http://{}/mcp", addr);
    let transport = Arc::new(StreamableHttpTransport::new(&endpoint).unwrap());
    let client = McpClient::builder("c", "1")
        .on_elicitation(|_params| async move {
            Ok(ElicitResult::accept(json!({"confirm": true})))
        })
        .build()
        .unwrap();

    let init = client.connect(transport.clone()).await.unwrap();
    assert_eq!(init.server_info.name, "loopback");
    assert!(transport.session_id().is_some(), "session id captured");

    // Plain request/response over POST.
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.tools.len(), 2);

    let mut arguments = Map::new();
    arguments.insert("message".to_string(), json!("hi"));
    let echoed = client.call_tool("echo", Some(arguments)).await.unwrap();
    assert_eq!(echoed.content[0].as_text(), Some("hi"));

    // Task-augmented call whose tool elicits through the tasks/result
    // stream.
    let mut arguments = Map::new();
    arguments.insert("name".to_string(), json!("f"));
    let mut updates = client
        .call_tool_stream(
            "delete_file",
            Some(arguments),
            TaskMetadata {
                ttl: Some(60_000),
                poll_interval: Some(50),
            },
        )
        .await
        .unwrap();
    let result = loop {
        match updates.recv().await.expect("stream ended without result") {
            ToolCallUpdate::Result(result) => break result,
            ToolCallUpdate::Error(e) => panic!("task failed: {}", e),
            ToolCallUpdate::TaskCreated(_) | ToolCallUpdate::TaskStatus(_) => {}
        }
    };
    assert_eq!(result.content[0].as_text(), Some("Deleted 'f'"));

    // Explicit teardown; the session is unusable afterwards.
    transport.terminate_session().await.unwrap();
    assert!(transport.session_id().is_none());
    assert!(client.ping().await.is_err());

    shutdown.cancel();
}
