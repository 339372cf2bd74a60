//! JSON-RPC 2.0 envelopes.
//!
//! The envelope set is closed: requests carry an `id` and expect exactly one
//! response; notifications carry no `id` and expect none; responses carry
//! either a `result` or an `error`, never both. Request IDs are strings or
//! non-negative integers, never null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{McpError, McpResult};

/// JSON-RPC version constant. Every envelope carries it verbatim.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request or response correlation ID.
///
/// JSON-RPC allows strings and integers; MCP additionally forbids null and
/// negative integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Validity check applied at the wire boundary.
    pub fn is_valid(&self) -> bool {
        match self {
            RequestId::Number(n) => *n >= 0,
            RequestId::String(s) => !s.is_empty(),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// A JSON-RPC request: expects exactly one matching response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Deserialize the params into a typed payload. Missing params decode as
    /// an empty object so parameterless methods stay ergonomic.
    pub fn parse_params<P: serde::de::DeserializeOwned>(&self) -> McpResult<P> {
        let value = self
            .params
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("{}: {}", self.method, e)))
    }

    /// Extract the reserved `_meta.progressToken` key, if the sender opted
    /// in to progress notifications.
    pub fn progress_token(&self) -> Option<crate::meta::ProgressToken> {
        let meta = self.params.as_ref()?.get("_meta")?;
        serde_json::from_value(meta.get("progressToken")?.clone()).ok()
    }
}

/// A JSON-RPC notification: fire-and-forget, no correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    pub fn parse_params<P: serde::de::DeserializeOwned>(&self) -> McpResult<P> {
        let value = self
            .params
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("{}: {}", self.method, e)))
    }
}

/// The error object inside an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Success xor error body of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Result { result: Value },
    Error { error: JsonRpcError },
}

/// A JSON-RPC response correlated to a previously sent request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result { result },
        }
    }

    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error { error },
        }
    }

    /// Build an error response straight from an `McpError`, preserving its
    /// wire code.
    pub fn from_error(id: RequestId, error: &McpError) -> Self {
        Self::error(id, error.to_json_rpc_error())
    }

    /// Convert into the `Result` the original requester awaits.
    pub fn into_result(self) -> McpResult<Value> {
        match self.payload {
            ResponsePayload::Result { result } => Ok(result),
            ResponsePayload::Error { error } => Err(McpError::from_json_rpc_error(error)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error { .. })
    }
}

/// Any message that may cross the wire.
///
/// Untagged decode order matters: a request shape (id + method) is tried
/// before a response (id + result/error), which is tried before a
/// notification (method only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Parse a single message from raw JSON text.
    pub fn from_json(text: &str) -> McpResult<Self> {
        let message: JsonRpcMessage =
            serde_json::from_str(text).map_err(|e| McpError::ParseError(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Structural checks beyond what serde enforces.
    pub fn validate(&self) -> McpResult<()> {
        let (jsonrpc, id) = match self {
            JsonRpcMessage::Request(r) => (&r.jsonrpc, Some(&r.id)),
            JsonRpcMessage::Response(r) => (&r.jsonrpc, Some(&r.id)),
            JsonRpcMessage::Notification(n) => (&n.jsonrpc, None),
        };
        if jsonrpc != JSONRPC_VERSION {
            return Err(McpError::InvalidRequest(format!(
                "unsupported jsonrpc version: {}",
                jsonrpc
            )));
        }
        if let Some(id) = id
            && !id.is_valid()
        {
            return Err(McpError::InvalidRequest(format!("invalid request id: {}", id)));
        }
        Ok(())
    }

    pub fn to_json(&self) -> McpResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            JsonRpcMessage::Response(_) => None,
        }
    }

    /// The correlation ID of a request or response.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Notification(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(r)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(n)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let request = JsonRpcRequest::new(7, "tools/list", Some(json!({"cursor": "abc"})));
        let text = serde_json::to_string(&request).unwrap();
        let decoded = JsonRpcMessage::from_json(&text).unwrap();
        match decoded {
            JsonRpcMessage::Request(r) => {
                assert_eq!(r.id, RequestId::Number(7));
                assert_eq!(r.method, "tools/list");
                assert_eq!(r.params.unwrap()["cursor"], "abc");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_string_ids_are_valid() {
        let msg = JsonRpcMessage::from_json(
            r#"{"jsonrpc":"2.0","id":"req-1","method":"ping"}"#,
        )
        .unwrap();
        assert_eq!(msg.request_id(), Some(&RequestId::String("req-1".into())));
    }

    #[test]
    fn test_negative_id_rejected() {
        let err = JsonRpcMessage::from_json(r#"{"jsonrpc":"2.0","id":-1,"method":"ping"}"#)
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[test]
    fn test_notification_has_no_id() {
        let msg = JsonRpcMessage::from_json(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert!(msg.request_id().is_none());
    }

    #[test]
    fn test_response_success_xor_error() {
        let ok = JsonRpcMessage::from_json(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(ok, JsonRpcMessage::Response(ref r) if !r.is_error()));

        let err = JsonRpcMessage::from_json(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap();
        match err {
            JsonRpcMessage::Response(r) => {
                let e = r.into_result().unwrap_err();
                assert_eq!(e.code(), Some(-32601));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_token_extraction() {
        let request = JsonRpcRequest::new(
            1,
            "tools/call",
            Some(json!({"name": "slow", "_meta": {"progressToken": "tok-9"}})),
        );
        let token = request.progress_token().unwrap();
        assert_eq!(token, crate::meta::ProgressToken::String("tok-9".into()));
    }

    #[test]
    fn test_wrong_jsonrpc_version_rejected() {
        let err =
            JsonRpcMessage::from_json(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }
}
