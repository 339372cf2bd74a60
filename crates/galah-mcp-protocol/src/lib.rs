//! # Model Context Protocol — wire vocabulary
//!
//! Typed JSON-RPC 2.0 envelopes plus every MCP request, result, and
//! notification payload used by the peer, client, server, and transport
//! crates. The envelope set is closed: a message is a request, a response
//! (success xor error), or a notification, and nothing else.
//!
//! All payload types serialize with camelCase field names and round-trip
//! losslessly through `serde_json`, including the free-form `_meta` section
//! carried by requests and results.

pub mod completion;
pub mod content;
pub mod elicitation;
pub mod error;
pub mod icons;
pub mod initialize;
pub mod json_rpc;
pub mod logging;
pub mod meta;
pub mod methods;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod sampling;
pub mod schema;
pub mod tasks;
pub mod tools;
pub mod version;

pub use completion::{
    CompleteArgument, CompleteContext, CompleteParams, CompleteReference, CompleteResult,
    Completion,
};
pub use content::{
    BlobResourceContents, Content, ResourceContents, Role, TextResourceContents,
};
pub use elicitation::{
    ElicitAction, ElicitCompleteParams, ElicitCreateParams, ElicitResult, ELICITATION_MODE_FORM,
    ELICITATION_MODE_URL,
};
pub use error::{error_codes, McpError, McpResult};
pub use icons::Icon;
pub use initialize::{
    ClientCapabilities, CompletionsCapability, ElicitationCapability, Implementation,
    InitializeParams, InitializeResult, LoggingCapability, PromptsCapability, ResourcesCapability,
    RootsCapability, SamplingCapability, ServerCapabilities, TasksCapability, ToolsCapability,
};
pub use json_rpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, ResponsePayload, JSONRPC_VERSION,
};
pub use logging::{LoggingLevel, LoggingMessageParams, SetLevelParams};
pub use meta::{Annotations, Cursor, ProgressToken};
pub use notifications::{CancelledParams, ProgressParams};
pub use prompts::{
    GetPromptParams, GetPromptResult, ListPromptsParams, ListPromptsResult, Prompt,
    PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesParams, ListResourceTemplatesResult, ListResourcesParams,
    ListResourcesResult, ReadResourceParams, ReadResourceResult, Resource, ResourceTemplate,
    ResourceUpdatedParams, SubscribeParams, UnsubscribeParams,
};
pub use sampling::{CreateMessageParams, CreateMessageResult, SamplingMessage};
pub use schema::{validate_against_schema, SchemaValidator, StructuralSchemaValidator};
pub use tasks::{
    CancelTaskParams, CreateTaskResult, GetTaskParams, ListTasksParams, ListTasksResult, Task,
    TaskMetadata, TaskResultParams, TaskStatus, TaskStatusNotificationParams,
};
pub use tools::{
    CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, TaskSupport, Tool,
    ToolAnnotations, ToolExecution,
};
pub use version::{is_supported_version, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
