//! `McpServer`: registries, capability assembly, handshake handling, and
//! server-initiated operations.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use galah_mcp_peer::{assert_client_capability, Peer, RequestContext, Transport};
use galah_mcp_protocol::methods;
use galah_mcp_protocol::{
    CallToolResult, ClientCapabilities, CompleteArgument, CompleteContext, CompletionsCapability,
    CreateMessageParams, CreateMessageResult, ElicitCreateParams, ElicitResult, GetPromptResult,
    Implementation, LoggingCapability, LoggingLevel, LoggingMessageParams, McpError, McpResult,
    Prompt, PromptsCapability, Resource, ResourceContents, ResourceTemplate, ResourceUpdatedParams,
    ResourcesCapability, ServerCapabilities, Task, TaskStatus, TaskStatusNotificationParams,
    TasksCapability, Tool, ToolsCapability,
};
use galah_mcp_tasks::{InMemoryTaskStore, TaskMessageQueue, TaskStore};

use crate::context::{untimed, ToolContext};
use crate::handlers;
use crate::uri_template::UriTemplate;

pub type ToolCallback = Arc<
    dyn Fn(serde_json::Map<String, Value>, ToolContext) -> BoxFuture<'static, McpResult<CallToolResult>>
        + Send
        + Sync,
>;
pub type ResourceReadCallback =
    Arc<dyn Fn(String, RequestContext) -> BoxFuture<'static, McpResult<Vec<ResourceContents>>> + Send + Sync>;
pub type TemplateReadCallback = Arc<
    dyn Fn(String, HashMap<String, String>, RequestContext) -> BoxFuture<'static, McpResult<Vec<ResourceContents>>>
        + Send
        + Sync,
>;
pub type ResourceListCallback =
    Arc<dyn Fn() -> BoxFuture<'static, McpResult<Vec<Resource>>> + Send + Sync>;
pub type PromptCallback = Arc<
    dyn Fn(HashMap<String, Value>, RequestContext) -> BoxFuture<'static, McpResult<GetPromptResult>>
        + Send
        + Sync,
>;
pub type CompletionCallback = Arc<
    dyn Fn(CompleteArgument, Option<CompleteContext>) -> BoxFuture<'static, McpResult<Vec<String>>>
        + Send
        + Sync,
>;

pub(crate) struct ToolEntry {
    pub tool: Tool,
    pub callback: ToolCallback,
}

pub(crate) struct ResourceEntry {
    pub resource: Resource,
    pub callback: ResourceReadCallback,
}

pub(crate) struct TemplateEntry {
    pub template: ResourceTemplate,
    pub matcher: UriTemplate,
    pub read: TemplateReadCallback,
    pub list: Option<ResourceListCallback>,
    pub complete: Option<CompletionCallback>,
}

pub(crate) struct PromptEntry {
    pub prompt: Prompt,
    pub callback: PromptCallback,
    pub complete: Option<CompletionCallback>,
}

pub(crate) struct ServerInner {
    pub(crate) peer: Peer,
    pub(crate) info: Implementation,
    pub(crate) instructions: Option<String>,
    pub(crate) capabilities: parking_lot::RwLock<ServerCapabilities>,
    pub(crate) negotiated_version: parking_lot::RwLock<Option<String>>,
    pub(crate) client_capabilities: parking_lot::RwLock<Option<ClientCapabilities>>,
    pub(crate) client_info: parking_lot::RwLock<Option<Implementation>>,
    pub(crate) tools: parking_lot::RwLock<HashMap<String, Arc<ToolEntry>>>,
    pub(crate) resources: parking_lot::RwLock<HashMap<String, Arc<ResourceEntry>>>,
    /// Registration order decides template match precedence
    pub(crate) templates: parking_lot::RwLock<Vec<Arc<TemplateEntry>>>,
    pub(crate) prompts: parking_lot::RwLock<HashMap<String, Arc<PromptEntry>>>,
    pub(crate) subscriptions: parking_lot::Mutex<HashSet<String>>,
    pub(crate) log_level: parking_lot::Mutex<Option<LoggingLevel>>,
    pub(crate) completed_url_elicitations: parking_lot::Mutex<HashSet<String>>,
    task_store: Arc<dyn TaskStore>,
    task_queue: Arc<TaskMessageQueue>,
    running_tasks: parking_lot::Mutex<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

/// The server role. Cheap to clone; one instance per session.
#[derive(Clone)]
pub struct McpServer {
    pub(crate) inner: Arc<ServerInner>,
}

/// Builder mirroring the information exchanged at `initialize` time.
pub struct McpServerBuilder {
    info: Implementation,
    instructions: Option<String>,
    logging: bool,
    completions: bool,
    task_store: Option<Arc<dyn TaskStore>>,
    reap_interval: Duration,
}

impl McpServer {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> McpServerBuilder {
        McpServerBuilder {
            info: Implementation::new(name, version),
            instructions: None,
            logging: false,
            completions: false,
            task_store: None,
            reap_interval: Duration::from_secs(5),
        }
    }

    /// Attach a transport. Initialization is driven by the client; this
    /// returns as soon as the receive loop is running.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> McpResult<()> {
        self.inner.peer.connect(transport).await
    }

    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        for (_, token) in self.inner.running_tasks.lock().drain() {
            token.cancel();
        }
        self.inner.peer.close().await;
    }

    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    pub fn server_info(&self) -> &Implementation {
        &self.inner.info
    }

    pub fn capabilities(&self) -> ServerCapabilities {
        self.inner.capabilities.read().clone()
    }

    /// Capabilities the client declared during `initialize`, once known.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.inner.client_capabilities.read().clone()
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.inner.client_info.read().clone()
    }

    pub fn negotiated_version(&self) -> Option<String> {
        self.inner.negotiated_version.read().clone()
    }

    pub(crate) fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.task_store
    }

    pub(crate) fn task_queue(&self) -> &Arc<TaskMessageQueue> {
        &self.inner.task_queue
    }

    // === Registration ===

    /// Register a tool. First registration installs the `tools/*` handlers
    /// and advertises the capability; registration after `connect` also
    /// notifies the client the list changed.
    pub fn register_tool<F, Fut>(&self, tool: Tool, callback: F) -> McpResult<()>
    where
        F: Fn(serde_json::Map<String, Value>, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
    {
        let name = tool.name.clone();
        {
            let mut tools = self.inner.tools.write();
            if tools.contains_key(&name) {
                return Err(McpError::InvalidRequest(format!(
                    "tool '{}' is already registered",
                    name
                )));
            }
            tools.insert(
                name.clone(),
                Arc::new(ToolEntry {
                    tool,
                    callback: Arc::new(move |args, context| Box::pin(callback(args, context))),
                }),
            );
        }
        self.ensure_tools_installed()?;
        debug!(tool = name, "tool registered");
        self.notify_list_changed(methods::NOTIF_TOOLS_LIST_CHANGED);
        Ok(())
    }

    /// Register a fixed-URI resource.
    pub fn register_resource<F, Fut>(&self, resource: Resource, callback: F) -> McpResult<()>
    where
        F: Fn(String, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        let uri = resource.uri.clone();
        {
            let mut resources = self.inner.resources.write();
            if resources.contains_key(&uri) {
                return Err(McpError::InvalidRequest(format!(
                    "resource '{}' is already registered",
                    uri
                )));
            }
            resources.insert(
                uri.clone(),
                Arc::new(ResourceEntry {
                    resource,
                    callback: Arc::new(move |uri, context| Box::pin(callback(uri, context))),
                }),
            );
        }
        self.ensure_resources_installed()?;
        debug!(uri, "resource registered");
        self.notify_list_changed(methods::NOTIF_RESOURCES_LIST_CHANGED);
        Ok(())
    }

    /// Register a resource template. Templates are tried in registration
    /// order when a read does not hit a fixed resource.
    pub fn register_resource_template<F, Fut>(
        &self,
        template: ResourceTemplate,
        read: F,
    ) -> McpResult<()>
    where
        F: Fn(String, HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        let matcher = UriTemplate::parse(&template.uri_template)?;
        {
            let mut templates = self.inner.templates.write();
            if templates.iter().any(|t| t.template.name == template.name) {
                return Err(McpError::InvalidRequest(format!(
                    "resource template '{}' is already registered",
                    template.name
                )));
            }
            templates.push(Arc::new(TemplateEntry {
                template,
                matcher,
                read: Arc::new(move |uri, vars, context| Box::pin(read(uri, vars, context))),
                list: None,
                complete: None,
            }));
        }
        self.ensure_resources_installed()?;
        self.notify_list_changed(methods::NOTIF_RESOURCES_LIST_CHANGED);
        Ok(())
    }

    /// Attach a `resources/list` contributor to a registered template.
    pub fn set_template_list_fn<F, Fut>(&self, template_name: &str, list: F) -> McpResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<Resource>>> + Send + 'static,
    {
        self.with_template(template_name, |entry| TemplateEntry {
            template: entry.template.clone(),
            matcher: entry.matcher.clone(),
            read: entry.read.clone(),
            list: Some(Arc::new(move || Box::pin(list()))),
            complete: entry.complete.clone(),
        })
    }

    /// Attach an argument completer to a registered template.
    pub fn set_template_completion<F, Fut>(&self, template_name: &str, complete: F) -> McpResult<()>
    where
        F: Fn(CompleteArgument, Option<CompleteContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<String>>> + Send + 'static,
    {
        self.ensure_completions_installed()?;
        self.with_template(template_name, |entry| TemplateEntry {
            template: entry.template.clone(),
            matcher: entry.matcher.clone(),
            read: entry.read.clone(),
            list: entry.list.clone(),
            complete: Some(Arc::new(move |argument, context| {
                Box::pin(complete(argument, context))
            })),
        })
    }

    fn with_template(
        &self,
        template_name: &str,
        rebuild: impl FnOnce(&TemplateEntry) -> TemplateEntry,
    ) -> McpResult<()> {
        let mut templates = self.inner.templates.write();
        let slot = templates
            .iter_mut()
            .find(|t| t.template.name == template_name)
            .ok_or_else(|| {
                McpError::InvalidParams(format!("no such resource template: {}", template_name))
            })?;
        let rebuilt = rebuild(slot.as_ref());
        *slot = Arc::new(rebuilt);
        Ok(())
    }

    /// Register a prompt template.
    pub fn register_prompt<F, Fut>(&self, prompt: Prompt, callback: F) -> McpResult<()>
    where
        F: Fn(HashMap<String, Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
    {
        let name = prompt.name.clone();
        {
            let mut prompts = self.inner.prompts.write();
            if prompts.contains_key(&name) {
                return Err(McpError::InvalidRequest(format!(
                    "prompt '{}' is already registered",
                    name
                )));
            }
            prompts.insert(
                name.clone(),
                Arc::new(PromptEntry {
                    prompt,
                    callback: Arc::new(move |args, context| Box::pin(callback(args, context))),
                    complete: None,
                }),
            );
        }
        self.ensure_prompts_installed()?;
        debug!(prompt = name, "prompt registered");
        self.notify_list_changed(methods::NOTIF_PROMPTS_LIST_CHANGED);
        Ok(())
    }

    /// Attach an argument completer to a registered prompt.
    pub fn set_prompt_completion<F, Fut>(&self, prompt_name: &str, complete: F) -> McpResult<()>
    where
        F: Fn(CompleteArgument, Option<CompleteContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<String>>> + Send + 'static,
    {
        self.ensure_completions_installed()?;
        let mut prompts = self.inner.prompts.write();
        let entry = prompts.get_mut(prompt_name).ok_or_else(|| {
            McpError::InvalidParams(format!("no such prompt: {}", prompt_name))
        })?;
        *entry = Arc::new(PromptEntry {
            prompt: entry.prompt.clone(),
            callback: entry.callback.clone(),
            complete: Some(Arc::new(move |argument, context| {
                Box::pin(complete(argument, context))
            })),
        });
        Ok(())
    }

    fn ensure_tools_installed(&self) -> McpResult<()> {
        let mut capabilities = self.inner.capabilities.write();
        if capabilities.tools.is_none() {
            capabilities.tools = Some(ToolsCapability {
                list_changed: Some(true),
            });
            drop(capabilities);
            handlers::install_tool_handlers(self)?;
        }
        Ok(())
    }

    fn ensure_resources_installed(&self) -> McpResult<()> {
        let mut capabilities = self.inner.capabilities.write();
        if capabilities.resources.is_none() {
            capabilities.resources = Some(ResourcesCapability {
                list_changed: Some(true),
                subscribe: Some(true),
            });
            drop(capabilities);
            handlers::install_resource_handlers(self)?;
        }
        Ok(())
    }

    fn ensure_prompts_installed(&self) -> McpResult<()> {
        let mut capabilities = self.inner.capabilities.write();
        if capabilities.prompts.is_none() {
            capabilities.prompts = Some(PromptsCapability {
                list_changed: Some(true),
            });
            drop(capabilities);
            handlers::install_prompt_handlers(self)?;
        }
        Ok(())
    }

    fn ensure_completions_installed(&self) -> McpResult<()> {
        {
            let mut capabilities = self.inner.capabilities.write();
            if capabilities.completions.is_none() {
                capabilities.completions = Some(CompletionsCapability::default());
            }
        }
        if !self.inner.peer.has_request_handler(methods::COMPLETION_COMPLETE) {
            handlers::install_completion_handler(self)?;
        }
        Ok(())
    }

    fn notify_list_changed(&self, method: &'static str) {
        if !self.inner.peer.is_initialized() {
            return;
        }
        let peer = self.inner.peer.clone();
        tokio::spawn(async move {
            if let Err(e) = peer.notification(method, None).await {
                debug!(method, error = %e, "list_changed notification not delivered");
            }
        });
    }

    // === Server-initiated operations ===

    /// Ask the connected client for structured user input (form mode).
    pub async fn elicit_user_input(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
    ) -> McpResult<ElicitResult> {
        self.assert_client(methods::ELICITATION_CREATE)?;
        let params = ElicitCreateParams::form(message, requested_schema);
        let value = self
            .inner
            .peer
            .request(
                methods::ELICITATION_CREATE,
                Some(serde_json::to_value(&params)?),
                untimed(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client to navigate the user to a URL. The returned future
    /// stays pending until the client responds; the matching
    /// `notifications/elicitation/complete` is advisory only.
    pub async fn elicit_user_input_via_url(
        &self,
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> McpResult<ElicitResult> {
        self.assert_client(methods::ELICITATION_CREATE)?;
        let params = ElicitCreateParams::url(message, url, elicitation_id);
        let value = self
            .inner
            .peer
            .request(
                methods::ELICITATION_CREATE,
                Some(serde_json::to_value(&params)?),
                untimed(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the client has signalled completion of a url-mode
    /// elicitation.
    pub fn url_elicitation_completed(&self, elicitation_id: &str) -> bool {
        self.inner
            .completed_url_elicitations
            .lock()
            .contains(elicitation_id)
    }

    /// Request an LLM inference from the client.
    pub async fn create_sampling_message(
        &self,
        params: CreateMessageParams,
    ) -> McpResult<CreateMessageResult> {
        self.assert_client(methods::SAMPLING_CREATE_MESSAGE)?;
        let value = self
            .inner
            .peer
            .request(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(serde_json::to_value(&params)?),
                untimed(),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Emit `notifications/message` if it clears the client-set level.
    pub async fn log_message(
        &self,
        level: LoggingLevel,
        logger: Option<String>,
        data: Value,
    ) -> McpResult<()> {
        if let Some(minimum) = *self.inner.log_level.lock()
            && level < minimum
        {
            return Ok(());
        }
        let params = LoggingMessageParams {
            level,
            logger,
            data,
        };
        self.inner
            .peer
            .notification(methods::NOTIF_MESSAGE, Some(serde_json::to_value(&params)?))
            .await
    }

    /// Emit `notifications/resources/updated` to subscribers of the URI.
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<()> {
        if !self.inner.subscriptions.lock().contains(uri) {
            return Ok(());
        }
        let params = ResourceUpdatedParams {
            uri: uri.to_string(),
        };
        self.inner
            .peer
            .notification(
                methods::NOTIF_RESOURCES_UPDATED,
                Some(serde_json::to_value(&params)?),
            )
            .await
    }

    fn assert_client(&self, method: &str) -> McpResult<()> {
        let capabilities = self
            .client_capabilities()
            .ok_or_else(|| McpError::InvalidRequest("client capabilities not yet known".into()))?;
        assert_client_capability(&capabilities, method)
    }

    // === Task plumbing ===

    pub(crate) fn register_running_task(&self, task_id: &str, token: CancellationToken) {
        self.inner
            .running_tasks
            .lock()
            .insert(task_id.to_string(), token);
    }

    pub(crate) fn unregister_running_task(&self, task_id: &str) {
        self.inner.running_tasks.lock().remove(task_id);
    }

    pub(crate) fn running_task_token(&self, task_id: &str) -> Option<CancellationToken> {
        self.inner.running_tasks.lock().get(task_id).cloned()
    }

    /// Transition a task and publish `notifications/tasks/status`.
    pub(crate) async fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
    ) -> McpResult<Task> {
        let task = self
            .inner
            .task_store
            .update_task_status(task_id, status, status_message)
            .await?;
        self.notify_task_status(&task).await;
        Ok(task)
    }

    /// Store a terminal result and publish the final status notification.
    pub(crate) async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: CallToolResult,
    ) {
        match self
            .inner
            .task_store
            .store_task_result(task_id, status, result)
            .await
        {
            Ok(task) => self.notify_task_status(&task).await,
            // Lost the race against cancellation or expiry; the store's
            // terminal state wins.
            Err(e) => debug!(task_id, error = %e, "task result not stored"),
        }
    }

    pub(crate) async fn notify_task_status(&self, task: &Task) {
        let params = TaskStatusNotificationParams {
            task_id: task.task_id.clone(),
            status: task.status,
            status_message: task.status_message.clone(),
        };
        let payload = match serde_json::to_value(&params) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "task status notification not serializable");
                return;
            }
        };
        // Best-effort: pollers see the same state via tasks/get.
        if let Err(e) = self
            .inner
            .peer
            .notification(methods::NOTIF_TASKS_STATUS, Some(payload))
            .await
        {
            debug!(task_id = task.task_id, error = %e, "task status notification not delivered");
        }
    }

    fn spawn_task_reaper(&self, interval: Duration) {
        let server = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = server.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match server.inner.task_store.remove_expired().await {
                            Ok(expired) => {
                                for task_id in expired {
                                    info!(task_id, "task expired");
                                    if let Some(token) = server.running_task_token(&task_id) {
                                        token.cancel();
                                    }
                                    server.unregister_running_task(&task_id);
                                    server.task_queue().remove(&task_id);
                                }
                            }
                            Err(e) => warn!(error = %e, "task expiry sweep failed"),
                        }
                    }
                }
            }
        });
    }
}

impl McpServerBuilder {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.info.title = Some(title.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Advertise the `logging` capability and accept `logging/setLevel`.
    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Advertise `completions` even before any completer is attached.
    pub fn with_completions(mut self) -> Self {
        self.completions = true;
        self
    }

    /// Swap the in-memory task store for another backend.
    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    /// TTL sweep cadence (default 5 s, capped at 30 s).
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval.min(Duration::from_secs(30));
        self
    }

    pub fn build(self) -> McpResult<McpServer> {
        let capabilities = ServerCapabilities {
            tasks: Some(TasksCapability {
                list: Some(true),
                cancel: Some(true),
                ..Default::default()
            }),
            logging: self.logging.then(LoggingCapability::default),
            completions: self.completions.then(CompletionsCapability::default),
            ..Default::default()
        };
        let server = McpServer {
            inner: Arc::new(ServerInner {
                peer: Peer::new(),
                info: self.info,
                instructions: self.instructions,
                capabilities: parking_lot::RwLock::new(capabilities),
                negotiated_version: parking_lot::RwLock::new(None),
                client_capabilities: parking_lot::RwLock::new(None),
                client_info: parking_lot::RwLock::new(None),
                tools: parking_lot::RwLock::new(HashMap::new()),
                resources: parking_lot::RwLock::new(HashMap::new()),
                templates: parking_lot::RwLock::new(Vec::new()),
                prompts: parking_lot::RwLock::new(HashMap::new()),
                subscriptions: parking_lot::Mutex::new(HashSet::new()),
                log_level: parking_lot::Mutex::new(None),
                completed_url_elicitations: parking_lot::Mutex::new(HashSet::new()),
                task_store: self
                    .task_store
                    .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new())),
                task_queue: Arc::new(TaskMessageQueue::new()),
                running_tasks: parking_lot::Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        };
        handlers::install_core_handlers(&server, self.logging)?;
        if self.completions {
            server.ensure_completions_installed()?;
        }
        server.spawn_task_reaper(self.reap_interval);
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_builder_advertises_registered_kinds() {
        let server = McpServer::builder("s", "1").with_logging().build().unwrap();
        assert!(server.capabilities().tools.is_none());
        assert!(server.capabilities().logging.is_some());
        assert!(server.capabilities().tasks.is_some());

        server
            .register_tool(
                Tool::new("echo", json!({"type": "object"})),
                |_args, _context| async move { Ok(CallToolResult::text("ok")) },
            )
            .unwrap();
        assert!(server.capabilities().tools.is_some());
        assert!(server.peer().has_request_handler(methods::TOOLS_CALL));
    }

    #[tokio::test]
    async fn test_duplicate_tool_rejected() {
        let server = McpServer::builder("s", "1").build().unwrap();
        let tool = Tool::new("echo", json!({"type": "object"}));
        server
            .register_tool(tool.clone(), |_a, _c| async move { Ok(CallToolResult::text("x")) })
            .unwrap();
        let err = server
            .register_tool(tool, |_a, _c| async move { Ok(CallToolResult::text("y")) })
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }
}
