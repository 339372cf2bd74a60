//! Protocol error taxonomy.
//!
//! Wire errors carry the standard JSON-RPC codes plus the MCP extensions
//! `-32000 ConnectionClosed` and `-32001 RequestTimeout`. The latter two are
//! manufactured locally when a transport dies or a deadline lapses and are
//! never serialized onto the wire.

use serde_json::Value;

use crate::json_rpc::JsonRpcError;

/// Numeric JSON-RPC error codes used by MCP.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const CONNECTION_CLOSED: i64 = -32000;
    pub const REQUEST_TIMEOUT: i64 = -32001;
}

/// Common result alias used across the workspace.
pub type McpResult<T> = Result<T, McpError>;

/// Every failure an MCP operation can surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Transport closed while a request was outstanding. Local only.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Per-request deadline elapsed without a response. Local only.
    #[error("Request timed out after {0} ms")]
    RequestTimeout(u64),

    /// The caller cancelled an outstanding request. Local only.
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// An error response produced by the peer, code preserved verbatim.
    #[error("Peer error {code}: {message}")]
    Peer {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl McpError {
    /// The wire code this error maps to, or `None` for purely local kinds.
    pub fn code(&self) -> Option<i64> {
        match self {
            McpError::ParseError(_) => Some(error_codes::PARSE_ERROR),
            McpError::InvalidRequest(_) => Some(error_codes::INVALID_REQUEST),
            McpError::MethodNotFound(_) => Some(error_codes::METHOD_NOT_FOUND),
            McpError::InvalidParams(_) => Some(error_codes::INVALID_PARAMS),
            McpError::Internal(_) => Some(error_codes::INTERNAL_ERROR),
            McpError::ConnectionClosed => Some(error_codes::CONNECTION_CLOSED),
            McpError::RequestTimeout(_) => Some(error_codes::REQUEST_TIMEOUT),
            McpError::Cancelled(_) => None,
            McpError::Peer { code, .. } => Some(*code),
        }
    }

    /// Convert to the wire error object. Locally-manufactured kinds collapse
    /// to `InternalError` if they ever need serializing.
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        let (code, data) = match self {
            McpError::Peer { code, data, .. } => (*code, data.clone()),
            other => (other.code().unwrap_or(error_codes::INTERNAL_ERROR), None),
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data,
        }
    }

    /// Reconstruct from a wire error object, mapping known codes back onto
    /// their typed variants so callers can match on them.
    pub fn from_json_rpc_error(error: JsonRpcError) -> Self {
        match error.code {
            error_codes::PARSE_ERROR => McpError::ParseError(error.message),
            error_codes::INVALID_REQUEST => McpError::InvalidRequest(error.message),
            error_codes::METHOD_NOT_FOUND => McpError::MethodNotFound(error.message),
            error_codes::INVALID_PARAMS => McpError::InvalidParams(error.message),
            error_codes::INTERNAL_ERROR => McpError::Internal(error.message),
            code => McpError::Peer {
                code,
                message: error.message,
                data: error.data,
            },
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Internal(format!("serialization failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_taxonomy() {
        assert_eq!(McpError::ParseError(String::new()).code(), Some(-32700));
        assert_eq!(McpError::InvalidRequest(String::new()).code(), Some(-32600));
        assert_eq!(McpError::MethodNotFound(String::new()).code(), Some(-32601));
        assert_eq!(McpError::InvalidParams(String::new()).code(), Some(-32602));
        assert_eq!(McpError::Internal(String::new()).code(), Some(-32603));
        assert_eq!(McpError::ConnectionClosed.code(), Some(-32000));
        assert_eq!(McpError::RequestTimeout(60_000).code(), Some(-32001));
    }

    #[test]
    fn test_peer_code_preserved_through_round_trip() {
        let wire = JsonRpcError {
            code: -32099,
            message: "backend unavailable".into(),
            data: None,
        };
        let typed = McpError::from_json_rpc_error(wire);
        assert_eq!(typed.code(), Some(-32099));
        assert_eq!(typed.to_json_rpc_error().code, -32099);
    }

    #[test]
    fn test_known_codes_map_to_typed_variants() {
        let typed = McpError::from_json_rpc_error(JsonRpcError {
            code: -32601,
            message: "nope".into(),
            data: None,
        });
        assert!(matches!(typed, McpError::MethodNotFound(_)));
    }
}
