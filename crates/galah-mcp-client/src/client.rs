//! Main MCP client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use galah_mcp_peer::{assert_server_capability, Peer, RequestOptions, Transport};
use galah_mcp_protocol::methods;
use galah_mcp_protocol::{
    is_supported_version, CallToolParams, CallToolResult, CancelTaskParams, ClientCapabilities,
    CompleteParams, CompleteResult, CreateMessageParams, CreateMessageResult, ElicitCreateParams,
    ElicitResult, GetPromptParams, GetPromptResult, GetTaskParams, Implementation,
    InitializeParams, InitializeResult, ListPromptsParams, ListPromptsResult,
    ListResourceTemplatesParams, ListResourceTemplatesResult, ListResourcesParams,
    ListResourcesResult, ListTasksParams, ListTasksResult, ListToolsParams, ListToolsResult,
    LoggingLevel, LoggingMessageParams, McpError, McpResult, ReadResourceParams,
    ReadResourceResult, SamplingCapability, SchemaValidator, ServerCapabilities, SetLevelParams,
    StructuralSchemaValidator, SubscribeParams, Task, TaskResultParams,
    TaskStatusNotificationParams, TasksCapability, Tool, UnsubscribeParams,
    LATEST_PROTOCOL_VERSION,
};
use galah_mcp_protocol::initialize::ElicitationCapability;

pub type SamplingCallback =
    Arc<dyn Fn(CreateMessageParams) -> BoxFuture<'static, McpResult<CreateMessageResult>> + Send + Sync>;
pub type ElicitationCallback =
    Arc<dyn Fn(ElicitCreateParams) -> BoxFuture<'static, McpResult<ElicitResult>> + Send + Sync>;
pub type TaskStatusCallback = Arc<dyn Fn(TaskStatusNotificationParams) + Send + Sync>;
pub type LogMessageCallback = Arc<dyn Fn(LoggingMessageParams) + Send + Sync>;

pub(crate) struct ClientInner {
    pub(crate) peer: Peer,
    info: Implementation,
    capabilities: ClientCapabilities,
    server_capabilities: parking_lot::RwLock<Option<ServerCapabilities>>,
    server_info: parking_lot::RwLock<Option<Implementation>>,
    instructions: parking_lot::RwLock<Option<String>>,
    negotiated_version: parking_lot::RwLock<Option<String>>,
    /// Tool specs learned from `tools/list`, keyed by name. Used for
    /// task-required rejection and output schema validation.
    tool_cache: parking_lot::Mutex<HashMap<String, Tool>>,
    validator: Arc<dyn SchemaValidator>,
}

/// The client role. Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct McpClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub struct McpClientBuilder {
    info: Implementation,
    sampling: Option<SamplingCallback>,
    elicitation: Option<ElicitationCallback>,
    task_status: Option<TaskStatusCallback>,
    log_message: Option<LogMessageCallback>,
    validator: Arc<dyn SchemaValidator>,
}

impl McpClient {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> McpClientBuilder {
        McpClientBuilder {
            info: Implementation::new(name, version),
            sampling: None,
            elicitation: None,
            task_status: None,
            log_message: None,
            validator: Arc::new(StructuralSchemaValidator),
        }
    }

    /// Connect the transport and run the initialization handshake. Returns
    /// after `notifications/initialized` has been sent; fails (closing the
    /// transport) if the server offers an unsupported protocol version.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> McpResult<InitializeResult> {
        self.inner.peer.connect(transport.clone()).await?;

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.inner.capabilities.clone(),
            client_info: self.inner.info.clone(),
            meta: None,
        };
        let value = self
            .inner
            .peer
            .request(
                methods::INITIALIZE,
                Some(serde_json::to_value(&params)?),
                RequestOptions::default(),
            )
            .await?;
        let result: InitializeResult = serde_json::from_value(value)?;

        if !is_supported_version(&result.protocol_version) {
            warn!(
                offered = result.protocol_version,
                "server offered unsupported protocol version; closing"
            );
            self.inner.peer.close().await;
            return Err(McpError::InvalidRequest(format!(
                "server offered unsupported protocol version: {}",
                result.protocol_version
            )));
        }

        *self.inner.server_capabilities.write() = Some(result.capabilities.clone());
        *self.inner.server_info.write() = Some(result.server_info.clone());
        *self.inner.instructions.write() = result.instructions.clone();
        *self.inner.negotiated_version.write() = Some(result.protocol_version.clone());

        // Lift the gate before announcing: the server may fire requests the
        // moment it sees the initialized notification.
        self.inner.peer.set_initialized(true);
        self.inner
            .peer
            .notification(methods::NOTIF_INITIALIZED, None)
            .await?;

        if let Err(e) = transport.open_standalone_stream().await {
            warn!(error = %e, "standalone stream not opened");
        }

        info!(
            server = result.server_info.name,
            version = result.protocol_version,
            "connected"
        );
        Ok(result)
    }

    pub async fn close(&self) {
        self.inner.peer.close().await;
    }

    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner.server_capabilities.read().clone()
    }

    pub fn server_info(&self) -> Option<Implementation> {
        self.inner.server_info.read().clone()
    }

    pub fn instructions(&self) -> Option<String> {
        self.inner.instructions.read().clone()
    }

    pub fn negotiated_version(&self) -> Option<String> {
        self.inner.negotiated_version.read().clone()
    }

    fn assert_server(&self, method: &str) -> McpResult<()> {
        let capabilities = self.server_capabilities().ok_or_else(|| {
            McpError::InvalidRequest("not connected: server capabilities unknown".into())
        })?;
        assert_server_capability(&capabilities, method)
    }

    async fn typed_request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
        options: RequestOptions,
    ) -> McpResult<R> {
        self.assert_server(method)?;
        let value = self
            .inner
            .peer
            .request(method, Some(serde_json::to_value(params)?), options)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // === Typed helpers ===

    pub async fn ping(&self) -> McpResult<()> {
        self.inner
            .peer
            .request(methods::PING, None, RequestOptions::default())
            .await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> McpResult<ListToolsResult> {
        let result: ListToolsResult = self
            .typed_request(
                methods::TOOLS_LIST,
                &ListToolsParams::default(),
                RequestOptions::default(),
            )
            .await?;
        let mut cache = self.inner.tool_cache.lock();
        for tool in &result.tools {
            cache.insert(tool.name.clone(), tool.clone());
        }
        Ok(result)
    }

    /// Call a tool directly. Rejected locally when the cached spec says the
    /// tool requires task-based execution; validates `structuredContent`
    /// against a cached `outputSchema`.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        let name = name.into();
        let cached = self.inner.tool_cache.lock().get(&name).cloned();
        if let Some(tool) = &cached
            && tool.requires_task()
        {
            return Err(McpError::InvalidRequest(format!(
                "Tool '{}' requires task-based execution",
                name
            )));
        }

        let params = CallToolParams {
            name: name.clone(),
            arguments,
            task: None,
            meta: None,
        };
        let result: CallToolResult = self
            .typed_request(methods::TOOLS_CALL, &params, RequestOptions::default())
            .await?;

        if let Some(tool) = &cached
            && let Some(schema) = &tool.output_schema
            && let Some(structured) = &result.structured_content
        {
            self.inner
                .validator
                .validate(schema, structured)
                .map_err(|e| {
                    McpError::Internal(format!(
                        "Structured content does not match the tool's output schema: {}",
                        e
                    ))
                })?;
        }
        Ok(result)
    }

    /// Raw `tools/call` with caller-controlled params and options. No cache
    /// checks; used by the task streaming helper.
    pub async fn call_tool_raw(
        &self,
        params: CallToolParams,
        options: RequestOptions,
    ) -> McpResult<Value> {
        self.assert_server(methods::TOOLS_CALL)?;
        self.inner
            .peer
            .request(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(&params)?),
                options,
            )
            .await
    }

    pub async fn list_resources(&self) -> McpResult<ListResourcesResult> {
        self.typed_request(
            methods::RESOURCES_LIST,
            &ListResourcesParams::default(),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn list_resource_templates(&self) -> McpResult<ListResourceTemplatesResult> {
        self.typed_request(
            methods::RESOURCES_TEMPLATES_LIST,
            &ListResourceTemplatesParams::default(),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.into(),
            meta: None,
        };
        self.typed_request(methods::RESOURCES_READ, &params, RequestOptions::default())
            .await
    }

    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let params = SubscribeParams { uri: uri.into() };
        let _: Value = self
            .typed_request(methods::RESOURCES_SUBSCRIBE, &params, RequestOptions::default())
            .await?;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let params = UnsubscribeParams { uri: uri.into() };
        let _: Value = self
            .typed_request(
                methods::RESOURCES_UNSUBSCRIBE,
                &params,
                RequestOptions::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn list_prompts(&self) -> McpResult<ListPromptsResult> {
        self.typed_request(
            methods::PROMPTS_LIST,
            &ListPromptsParams::default(),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        let params = GetPromptParams {
            name: name.into(),
            arguments,
            meta: None,
        };
        self.typed_request(methods::PROMPTS_GET, &params, RequestOptions::default())
            .await
    }

    pub async fn complete(&self, params: CompleteParams) -> McpResult<CompleteResult> {
        self.typed_request(methods::COMPLETION_COMPLETE, &params, RequestOptions::default())
            .await
    }

    /// Advise the server that a url-mode elicitation finished out of band.
    pub async fn notify_elicitation_complete(
        &self,
        elicitation_id: impl Into<String>,
    ) -> McpResult<()> {
        let params = galah_mcp_protocol::ElicitCompleteParams {
            elicitation_id: elicitation_id.into(),
        };
        self.inner
            .peer
            .notification(
                methods::NOTIF_ELICITATION_COMPLETE,
                Some(serde_json::to_value(&params)?),
            )
            .await
    }

    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        let params = SetLevelParams { level };
        let _: Value = self
            .typed_request(methods::LOGGING_SET_LEVEL, &params, RequestOptions::default())
            .await?;
        Ok(())
    }

    // === Task helpers ===

    pub async fn list_tasks(&self) -> McpResult<ListTasksResult> {
        self.typed_request(
            methods::TASKS_LIST,
            &ListTasksParams::default(),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn get_task(&self, task_id: impl Into<String>) -> McpResult<Task> {
        let params = GetTaskParams {
            task_id: task_id.into(),
        };
        self.typed_request(methods::TASKS_GET, &params, RequestOptions::default())
            .await
    }

    pub async fn cancel_task(&self, task_id: impl Into<String>) -> McpResult<Task> {
        let params = CancelTaskParams {
            task_id: task_id.into(),
        };
        self.typed_request(methods::TASKS_CANCEL, &params, RequestOptions::default())
            .await
    }

    /// Retrieve a task's final result, waiting for the task to finish. The
    /// server forwards any pending reverse requests during the wait, so
    /// there is no deadline here.
    pub async fn task_result(&self, task_id: impl Into<String>) -> McpResult<CallToolResult> {
        let params = TaskResultParams {
            task_id: task_id.into(),
        };
        self.typed_request(
            methods::TASKS_RESULT,
            &params,
            RequestOptions {
                timeout: Some(Duration::ZERO),
                ..Default::default()
            },
        )
        .await
    }
}

impl McpClientBuilder {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.info.title = Some(title.into());
        self
    }

    /// Handle server-initiated `sampling/createMessage`. Setting this
    /// advertises the `sampling` capability.
    pub fn on_sampling<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(CreateMessageParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = McpResult<CreateMessageResult>> + Send + 'static,
    {
        self.sampling = Some(Arc::new(move |params| Box::pin(callback(params))));
        self
    }

    /// Handle server-initiated `elicitation/create`. Setting this
    /// advertises the `elicitation` capability.
    pub fn on_elicitation<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ElicitCreateParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = McpResult<ElicitResult>> + Send + 'static,
    {
        self.elicitation = Some(Arc::new(move |params| Box::pin(callback(params))));
        self
    }

    /// Observe `notifications/tasks/status`.
    pub fn on_task_status<F>(mut self, callback: F) -> Self
    where
        F: Fn(TaskStatusNotificationParams) + Send + Sync + 'static,
    {
        self.task_status = Some(Arc::new(callback));
        self
    }

    /// Observe `notifications/message` log events.
    pub fn on_log_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(LoggingMessageParams) + Send + Sync + 'static,
    {
        self.log_message = Some(Arc::new(callback));
        self
    }

    /// Swap the structural validator for a full JSON Schema implementation.
    pub fn with_schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn build(self) -> McpResult<McpClient> {
        let capabilities = ClientCapabilities {
            sampling: self.sampling.as_ref().map(|_| SamplingCapability::default()),
            elicitation: self
                .elicitation
                .as_ref()
                .map(|_| ElicitationCapability::default()),
            tasks: Some(TasksCapability {
                list: Some(true),
                cancel: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let client = McpClient {
            inner: Arc::new(ClientInner {
                peer: Peer::new(),
                info: self.info,
                capabilities,
                server_capabilities: parking_lot::RwLock::new(None),
                server_info: parking_lot::RwLock::new(None),
                instructions: parking_lot::RwLock::new(None),
                negotiated_version: parking_lot::RwLock::new(None),
                tool_cache: parking_lot::Mutex::new(HashMap::new()),
                validator: self.validator,
            }),
        };
        let peer = client.inner.peer.clone();

        peer.set_request_handler(methods::PING, |_request, _context| async move {
            Ok(serde_json::json!({}))
        })?;

        // Absent callbacks leave the method unhandled, so the peer answers
        // MethodNotFound on its own.
        if let Some(sampling) = self.sampling {
            peer.set_request_handler(methods::SAMPLING_CREATE_MESSAGE, move |request, _context| {
                let sampling = sampling.clone();
                async move {
                    let params: CreateMessageParams = request.parse_params()?;
                    let result = sampling(params).await?;
                    Ok(serde_json::to_value(result)?)
                }
            })?;
        }

        if let Some(elicitation) = self.elicitation {
            peer.set_request_handler(methods::ELICITATION_CREATE, move |request, _context| {
                let elicitation = elicitation.clone();
                async move {
                    let params: ElicitCreateParams = request.parse_params()?;
                    let result = elicitation(params).await?;
                    Ok(serde_json::to_value(result)?)
                }
            })?;
        }

        if let Some(task_status) = self.task_status {
            peer.set_notification_handler(methods::NOTIF_TASKS_STATUS, move |notification| {
                let task_status = task_status.clone();
                async move {
                    match notification.parse_params::<TaskStatusNotificationParams>() {
                        Ok(params) => task_status(params),
                        Err(e) => debug!(error = %e, "malformed task status notification"),
                    }
                }
            })?;
        }

        if let Some(log_message) = self.log_message {
            peer.set_notification_handler(methods::NOTIF_MESSAGE, move |notification| {
                let log_message = log_message.clone();
                async move {
                    match notification.parse_params::<LoggingMessageParams>() {
                        Ok(params) => log_message(params),
                        Err(e) => debug!(error = %e, "malformed log notification"),
                    }
                }
            })?;
        }

        Ok(client)
    }
}
