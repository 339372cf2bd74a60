//! Handler-level tests: requests built by hand, no sockets.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};

use galah_http_mcp_server::{
    Authenticator, DnsRebindingConfig, HttpServerConfig, InMemoryEventStore,
    StreamableHttpService,
};
use galah_mcp_protocol::{CallToolResult, LoggingLevel, McpError, Tool};
use galah_mcp_server::McpServer;

const SESSION_HEADER: &str = "mcp-session-id";

fn echo_server() -> Result<McpServer, McpError> {
    let server = McpServer::builder("s", "1").with_logging().build()?;
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
    Ok(server)
}

fn service() -> StreamableHttpService {
    StreamableHttpService::new(echo_server, HttpServerConfig::new())
}

fn request(method: Method, body: Option<Value>, headers: &[(&str, &str)]) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri("/mcp");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let bytes = body
        .map(|value| Bytes::from(serde_json::to_vec(&value).unwrap()))
        .unwrap_or_default();
    builder.body(Full::new(bytes)).unwrap()
}

fn post_json(body: Value, session: Option<&str>) -> Request<Full<Bytes>> {
    let mut headers = vec![
        ("content-type", "application/json"),
        ("accept", "application/json"),
    ];
    if let Some(session) = session {
        headers.push((SESSION_HEADER, session));
    }
    request(Method::POST, Some(body), &headers)
}

fn initialize_body(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "1"}
        }
    })
}

async fn body_json(response: Response<BoxBody<Bytes, Infallible>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Open a session through the handshake, returning the session ID.
async fn initialized_session(service: &StreamableHttpService) -> String {
    let response = service.handle(post_json(initialize_body(0), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

    let notify = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    let response = service.handle(post_json(notify, Some(&session_id))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    session_id
}

/// One formatted SSE event read off a body frame.
fn parse_sse_frame(text: &str) -> (String, Value) {
    let mut id = String::new();
    let mut data = Vec::new();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("id: ") {
            id = value.to_string();
        } else if let Some(value) = line.strip_prefix("data: ") {
            data.push(value.to_string());
        }
    }
    (id, serde_json::from_str(&data.join("\n")).unwrap())
}

async fn next_sse_event(body: &mut BoxBody<Bytes, Infallible>) -> Option<(String, Value)> {
    let frame = body.frame().await?.ok()?;
    let bytes = frame.into_data().ok()?;
    Some(parse_sse_frame(&String::from_utf8_lossy(&bytes)))
}

#[tokio::test]
async fn test_options_returns_cors() {
    let service = service();
    let response = service.handle(request(Method::OPTIONS, None, &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get("Access-Control-Allow-Methods").unwrap(),
        "GET, POST, DELETE, OPTIONS"
    );
    assert_eq!(
        headers.get("Access-Control-Expose-Headers").unwrap(),
        "mcp-session-id"
    );
}

#[tokio::test]
async fn test_initialize_handshake_over_http() {
    let service = service();
    let session_id = initialized_session(&service).await;
    assert_eq!(service.session_count(), 1);

    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let response = service.handle(post_json(list, Some(&session_id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["result"]["tools"][0]["name"], "echo");
}

#[tokio::test]
async fn test_missing_and_unknown_sessions() {
    let service = service();
    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});

    let response = service.handle(post_json(list.clone(), None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = service.handle(post_json(list, Some("nope"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let service = service();
    let mut builder = Request::builder().method(Method::POST).uri("/mcp");
    builder = builder.header(CONTENT_TYPE, "application/json");
    let request = builder.body(Full::new(Bytes::from_static(b"{not json"))).unwrap();
    let response = service.handle(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_teardown() {
    let service = service();
    let session_id = initialized_session(&service).await;

    let response = service
        .handle(request(Method::DELETE, None, &[(SESSION_HEADER, session_id.as_str())]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(service.session_count(), 0);

    // The session is gone; subsequent traffic is rejected.
    let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let response = service.handle(post_json(list, Some(&session_id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_disabled_returns_405() {
    let service = StreamableHttpService::new(
        echo_server,
        HttpServerConfig::new().without_client_termination(),
    );
    let session_id = initialized_session(&service).await;
    let response = service
        .handle(request(Method::DELETE, None, &[(SESSION_HEADER, session_id.as_str())]))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_standalone_stream_rules() {
    let service = service();

    let response = service
        .handle(request(Method::GET, None, &[(ACCEPT.as_str(), "text/event-stream")]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let session_id = initialized_session(&service).await;
    let first = service
        .handle(request(
            Method::GET,
            None,
            &[(ACCEPT.as_str(), "text/event-stream"), (SESSION_HEADER, session_id.as_str())],
        ))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers().get(CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let second = service
        .handle(request(
            Method::GET,
            None,
            &[(ACCEPT.as_str(), "text/event-stream"), (SESSION_HEADER, session_id.as_str())],
        ))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_per_request_sse_ends_with_response() {
    let service = service();
    let session_id = initialized_session(&service).await;

    let call = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": "echo", "arguments": {"message": "hi"}}
    });
    let response = service
        .handle(request(
            Method::POST,
            Some(call),
            &[
                ("content-type", "application/json"),
                ("accept", "application/json, text/event-stream"),
                (SESSION_HEADER, session_id.as_str()),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut body = response.into_body();
    let mut events = Vec::new();
    while let Some(event) = next_sse_event(&mut body).await {
        events.push(event);
    }
    // The response is the last event and implies EOF.
    let (event_id, message) = events.last().unwrap();
    assert!(!event_id.is_empty());
    assert_eq!(message["id"], 7);
    assert_eq!(message["result"]["content"][0]["text"], "hi");
}

struct SharedFactory {
    servers: parking_lot::Mutex<Vec<McpServer>>,
}

#[tokio::test]
async fn test_replay_after_reconnect() {
    let shared = Arc::new(SharedFactory {
        servers: parking_lot::Mutex::new(Vec::new()),
    });
    let stash = shared.clone();
    let service = StreamableHttpService::new(
        move || {
            let server = echo_server()?;
            stash.servers.lock().push(server.clone());
            Ok(server)
        },
        HttpServerConfig::new(),
    )
    .with_event_store(Arc::new(InMemoryEventStore::new()));

    let session_id = initialized_session(&service).await;
    let server = shared.servers.lock().last().unwrap().clone();

    let first = service
        .handle(request(
            Method::GET,
            None,
            &[(ACCEPT.as_str(), "text/event-stream"), (SESSION_HEADER, session_id.as_str())],
        ))
        .await;
    let mut body = first.into_body();

    server
        .log_message(LoggingLevel::Info, None, json!({"n": 1}))
        .await
        .unwrap();
    server
        .log_message(LoggingLevel::Info, None, json!({"n": 2}))
        .await
        .unwrap();

    let (_id1, msg1) = next_sse_event(&mut body).await.unwrap();
    let (id2, msg2) = next_sse_event(&mut body).await.unwrap();
    assert_eq!(msg1["params"]["data"]["n"], 1);
    assert_eq!(msg2["params"]["data"]["n"], 2);
    drop(body);

    // Emitted while disconnected: lands in the event store only.
    server
        .log_message(LoggingLevel::Info, None, json!({"n": 3}))
        .await
        .unwrap();

    let reconnect = service
        .handle(request(
            Method::GET,
            None,
            &[
                (ACCEPT.as_str(), "text/event-stream"),
                (SESSION_HEADER, session_id.as_str()),
                ("last-event-id", id2.as_str()),
            ],
        ))
        .await;
    assert_eq!(reconnect.status(), StatusCode::OK);
    let mut body = reconnect.into_body();
    let (id3, msg3) = next_sse_event(&mut body).await.unwrap();
    assert_eq!(msg3["params"]["data"]["n"], 3);
    assert!(id3 > id2, "replayed ids keep increasing");
}

#[tokio::test]
async fn test_dns_rebinding_protection() {
    let service = StreamableHttpService::new(
        echo_server,
        HttpServerConfig::new().with_dns_rebinding_protection(DnsRebindingConfig::default()),
    );

    let mut bad = post_json(initialize_body(0), None);
    bad.headers_mut().insert(HOST, "evil.example.com".parse().unwrap());
    let response = service.handle(bad).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut good = post_json(initialize_body(0), None);
    good.headers_mut().insert(HOST, "localhost:8080".parse().unwrap());
    let response = service.handle(good).await;
    assert_eq!(response.status(), StatusCode::OK);
}

struct BearerAuth;

#[async_trait::async_trait]
impl Authenticator for BearerAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer valid")
    }
}

#[tokio::test]
async fn test_authenticator_rejects_with_403() {
    let service = StreamableHttpService::new(
        echo_server,
        HttpServerConfig::new().with_authenticator(Arc::new(BearerAuth)),
    );

    let response = service.handle(post_json(initialize_body(0), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut authed = post_json(initialize_body(0), None);
    authed
        .headers_mut()
        .insert("authorization", "Bearer valid".parse().unwrap());
    let response = service.handle(authed).await;
    assert_eq!(response.status(), StatusCode::OK);
}
