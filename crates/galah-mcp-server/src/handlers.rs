//! Wire-method handlers installed on the peer.
//!
//! Core handlers (handshake, ping, tasks) go in at build time; tool,
//! resource, prompt, and completion handlers go in on first registration of
//! their kind, alongside the capability advertisement.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use galah_mcp_peer::RequestContext;
use galah_mcp_protocol::methods;
use galah_mcp_protocol::{
    is_supported_version, CallToolParams, CallToolResult, CancelTaskParams, CompleteParams,
    CompleteReference, CompleteResult, Completion, CreateTaskResult, ElicitCompleteParams,
    GetPromptParams, GetTaskParams, InitializeParams, InitializeResult, JsonRpcRequest,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListTasksResult,
    ListToolsResult, McpError, McpResult, ReadResourceParams, ReadResourceResult, Resource,
    SetLevelParams, SubscribeParams, TaskResultParams, TaskStatus, TaskSupport,
    UnsubscribeParams, LATEST_PROTOCOL_VERSION,
};

use crate::context::ToolContext;
use crate::server::{McpServer, ResourceListCallback, TemplateEntry};
use crate::tasks;

/// `completion/complete` returns at most this many values.
const MAX_COMPLETION_VALUES: usize = 100;

pub(crate) fn install_core_handlers(server: &McpServer, logging: bool) -> McpResult<()> {
    let peer = server.peer().clone();

    let s = server.clone();
    peer.set_request_handler(methods::INITIALIZE, move |request, _context| {
        let s = s.clone();
        async move { handle_initialize(s, request).await }
    })?;

    peer.set_request_handler(methods::PING, |_request, _context| async move { Ok(json!({})) })?;

    let s = server.clone();
    peer.set_notification_handler(methods::NOTIF_INITIALIZED, move |_notification| {
        let s = s.clone();
        async move {
            info!("initialization handshake complete");
            s.peer().set_initialized(true);
        }
    })?;

    let s = server.clone();
    peer.set_notification_handler(methods::NOTIF_ELICITATION_COMPLETE, move |notification| {
        let s = s.clone();
        async move {
            match notification.parse_params::<ElicitCompleteParams>() {
                Ok(params) => {
                    s.inner
                        .completed_url_elicitations
                        .lock()
                        .insert(params.elicitation_id);
                }
                Err(e) => warn!(error = %e, "malformed elicitation completion notification"),
            }
        }
    })?;

    if logging {
        let s = server.clone();
        peer.set_request_handler(methods::LOGGING_SET_LEVEL, move |request, _context| {
            let s = s.clone();
            async move {
                let params: SetLevelParams = request.parse_params()?;
                *s.inner.log_level.lock() = Some(params.level);
                Ok(json!({}))
            }
        })?;
    }

    install_task_handlers(server, &peer)?;
    Ok(())
}

async fn handle_initialize(server: McpServer, request: JsonRpcRequest) -> McpResult<Value> {
    let params: InitializeParams = request.parse_params()?;
    info!(
        client = params.client_info.name,
        client_version = params.client_info.version,
        requested = params.protocol_version,
        "initialize received"
    );
    // Echo a supported requested version; otherwise answer with the latest
    // and let the client decide whether it can proceed.
    let negotiated = if is_supported_version(&params.protocol_version) {
        params.protocol_version.clone()
    } else {
        LATEST_PROTOCOL_VERSION.to_string()
    };
    *server.inner.client_capabilities.write() = Some(params.capabilities);
    *server.inner.client_info.write() = Some(params.client_info);
    *server.inner.negotiated_version.write() = Some(negotiated.clone());

    let result = InitializeResult {
        protocol_version: negotiated,
        capabilities: server.capabilities(),
        server_info: server.server_info().clone(),
        instructions: server.inner.instructions.clone(),
        meta: None,
    };
    Ok(serde_json::to_value(result)?)
}

fn install_task_handlers(
    server: &McpServer,
    peer: &galah_mcp_peer::Peer,
) -> McpResult<()> {
    let s = server.clone();
    peer.set_request_handler(methods::TASKS_GET, move |request, _context| {
        let s = s.clone();
        async move {
            let params: GetTaskParams = request.parse_params()?;
            let task = s.task_store().get_task(&params.task_id).await?;
            Ok(serde_json::to_value(task)?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::TASKS_LIST, move |_request, _context| {
        let s = s.clone();
        async move {
            let mut tasks = s.task_store().get_all_tasks().await?;
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(serde_json::to_value(ListTasksResult {
                tasks,
                next_cursor: None,
            })?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::TASKS_CANCEL, move |request, _context| {
        let s = s.clone();
        async move {
            let params: CancelTaskParams = request.parse_params()?;
            if let Some(token) = s.running_task_token(&params.task_id) {
                token.cancel();
            }
            let task = s
                .set_task_status(
                    &params.task_id,
                    TaskStatus::Cancelled,
                    Some("cancelled by request".to_string()),
                )
                .await?;
            Ok(serde_json::to_value(task)?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::TASKS_RESULT, move |request, context| {
        let s = s.clone();
        async move {
            let params: TaskResultParams = request.parse_params()?;
            tasks::handle_task_result(s, context, params).await
        }
    })?;
    Ok(())
}

pub(crate) fn install_tool_handlers(server: &McpServer) -> McpResult<()> {
    let peer = server.peer().clone();

    let s = server.clone();
    peer.set_request_handler(methods::TOOLS_LIST, move |_request, _context| {
        let s = s.clone();
        async move {
            let mut tools: Vec<_> = s
                .inner
                .tools
                .read()
                .values()
                .map(|entry| entry.tool.clone())
                .collect();
            tools.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(serde_json::to_value(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::TOOLS_CALL, move |request, context| {
        let s = s.clone();
        async move { handle_call_tool(s, request, context).await }
    })?;
    Ok(())
}

async fn handle_call_tool(
    server: McpServer,
    request: JsonRpcRequest,
    context: RequestContext,
) -> McpResult<Value> {
    let params: CallToolParams = request.parse_params()?;
    let entry = server
        .inner
        .tools
        .read()
        .get(&params.name)
        .cloned()
        .ok_or_else(|| McpError::MethodNotFound(format!("Tool not found: {}", params.name)))?;
    let arguments = params.arguments.unwrap_or_default();

    if let Some(task_metadata) = params.task {
        let forbidden = matches!(
            entry.tool.execution.as_ref().and_then(|e| e.task_support),
            Some(TaskSupport::Forbidden)
        );
        if forbidden {
            return Err(McpError::InvalidRequest(format!(
                "Tool '{}' does not support task-based execution",
                params.name
            )));
        }
        let task = server
            .task_store()
            .create_task(&params.name, Value::Object(arguments.clone()), &task_metadata)
            .await?;
        tasks::spawn_task_execution(
            server.clone(),
            entry.callback.clone(),
            arguments,
            task.clone(),
        );
        return Ok(serde_json::to_value(CreateTaskResult { task })?);
    }

    if entry.tool.requires_task() {
        return Err(McpError::InvalidRequest(format!(
            "Tool '{}' requires task-based execution",
            params.name
        )));
    }

    let tool_context = ToolContext::direct(server.clone(), context);
    // Tool failures stay tool-level: an isError result, not a wire error.
    let result = match (entry.callback)(arguments, tool_context).await {
        Ok(result) => result,
        Err(e) => CallToolResult::error(e.to_string()),
    };
    Ok(serde_json::to_value(result)?)
}

pub(crate) fn install_resource_handlers(server: &McpServer) -> McpResult<()> {
    let peer = server.peer().clone();

    let s = server.clone();
    peer.set_request_handler(methods::RESOURCES_LIST, move |_request, _context| {
        let s = s.clone();
        async move {
            let mut all: Vec<Resource> = s
                .inner
                .resources
                .read()
                .values()
                .map(|entry| entry.resource.clone())
                .collect();
            all.sort_by(|a, b| a.uri.cmp(&b.uri));
            let contributors: Vec<ResourceListCallback> = s
                .inner
                .templates
                .read()
                .iter()
                .filter_map(|t| t.list.clone())
                .collect();
            for list in contributors {
                match list().await {
                    Ok(mut extra) => all.append(&mut extra),
                    // A failing contributor contributes nothing.
                    Err(e) => warn!(error = %e, "resource list contributor failed"),
                }
            }
            Ok(serde_json::to_value(ListResourcesResult {
                resources: all,
                next_cursor: None,
                meta: None,
            })?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::RESOURCES_TEMPLATES_LIST, move |_request, _context| {
        let s = s.clone();
        async move {
            let templates: Vec<_> = s
                .inner
                .templates
                .read()
                .iter()
                .map(|t| t.template.clone())
                .collect();
            Ok(serde_json::to_value(ListResourceTemplatesResult {
                resource_templates: templates,
                next_cursor: None,
            })?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::RESOURCES_READ, move |request, context| {
        let s = s.clone();
        async move {
            let params: ReadResourceParams = request.parse_params()?;
            handle_read_resource(s, params, context).await
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::RESOURCES_SUBSCRIBE, move |request, _context| {
        let s = s.clone();
        async move {
            let params: SubscribeParams = request.parse_params()?;
            s.inner.subscriptions.lock().insert(params.uri);
            Ok(json!({}))
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::RESOURCES_UNSUBSCRIBE, move |request, _context| {
        let s = s.clone();
        async move {
            let params: UnsubscribeParams = request.parse_params()?;
            s.inner.subscriptions.lock().remove(&params.uri);
            Ok(json!({}))
        }
    })?;
    Ok(())
}

async fn handle_read_resource(
    server: McpServer,
    params: ReadResourceParams,
    context: RequestContext,
) -> McpResult<Value> {
    let entry = server.inner.resources.read().get(&params.uri).cloned();
    if let Some(entry) = entry {
        let contents = (entry.callback)(params.uri.clone(), context).await?;
        return Ok(serde_json::to_value(ReadResourceResult {
            contents,
            meta: None,
        })?);
    }

    let templates: Vec<Arc<TemplateEntry>> = server.inner.templates.read().clone();
    for template in templates {
        if let Some(variables) = template.matcher.matches(&params.uri) {
            let contents =
                (template.read)(params.uri.clone(), variables, context.clone()).await?;
            return Ok(serde_json::to_value(ReadResourceResult {
                contents,
                meta: None,
            })?);
        }
    }

    Err(McpError::InvalidParams(format!(
        "Resource not found: {}",
        params.uri
    )))
}

pub(crate) fn install_prompt_handlers(server: &McpServer) -> McpResult<()> {
    let peer = server.peer().clone();

    let s = server.clone();
    peer.set_request_handler(methods::PROMPTS_LIST, move |_request, _context| {
        let s = s.clone();
        async move {
            let mut prompts: Vec<_> = s
                .inner
                .prompts
                .read()
                .values()
                .map(|entry| entry.prompt.clone())
                .collect();
            prompts.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(serde_json::to_value(ListPromptsResult {
                prompts,
                next_cursor: None,
            })?)
        }
    })?;

    let s = server.clone();
    peer.set_request_handler(methods::PROMPTS_GET, move |request, context| {
        let s = s.clone();
        async move {
            let params: GetPromptParams = request.parse_params()?;
            let entry = s
                .inner
                .prompts
                .read()
                .get(&params.name)
                .cloned()
                .ok_or_else(|| {
                    McpError::InvalidParams(format!("Prompt not found: {}", params.name))
                })?;
            let arguments = params.arguments.unwrap_or_default();

            if let Some(declared) = &entry.prompt.arguments {
                let missing: Vec<&str> = declared
                    .iter()
                    .filter(|a| a.required == Some(true) && !arguments.contains_key(&a.name))
                    .map(|a| a.name.as_str())
                    .collect();
                if !missing.is_empty() {
                    return Err(McpError::InvalidParams(format!(
                        "Missing required arguments: {}",
                        missing.join(", ")
                    )));
                }
                let mistyped: Vec<String> = declared
                    .iter()
                    .filter(|a| arguments.get(&a.name).is_some_and(|v| !v.is_string()))
                    .map(|a| format!("{} (expected string)", a.name))
                    .collect();
                if !mistyped.is_empty() {
                    return Err(McpError::InvalidParams(format!(
                        "Invalid argument types: {}",
                        mistyped.join(", ")
                    )));
                }
            }

            let result = (entry.callback)(arguments, context).await?;
            Ok(serde_json::to_value(result)?)
        }
    })?;
    Ok(())
}

pub(crate) fn install_completion_handler(server: &McpServer) -> McpResult<()> {
    let peer = server.peer().clone();

    let s = server.clone();
    peer.set_request_handler(methods::COMPLETION_COMPLETE, move |request, _context| {
        let s = s.clone();
        async move {
            let params: CompleteParams = request.parse_params()?;
            let completer = match &params.reference {
                CompleteReference::Prompt { name } => s
                    .inner
                    .prompts
                    .read()
                    .get(name)
                    .and_then(|entry| entry.complete.clone())
                    .ok_or_else(|| {
                        McpError::InvalidParams(format!("No completions for prompt: {}", name))
                    })?,
                CompleteReference::Resource { uri } => s
                    .inner
                    .templates
                    .read()
                    .iter()
                    .find(|t| t.template.uri_template == *uri)
                    .and_then(|t| t.complete.clone())
                    .ok_or_else(|| {
                        McpError::InvalidParams(format!(
                            "No completions for resource template: {}",
                            uri
                        ))
                    })?,
            };

            let mut values = completer(params.argument, params.context).await?;
            let total = values.len() as u64;
            let has_more = values.len() > MAX_COMPLETION_VALUES;
            values.truncate(MAX_COMPLETION_VALUES);
            Ok(serde_json::to_value(CompleteResult {
                completion: Completion {
                    values,
                    total: Some(total),
                    has_more: Some(has_more),
                },
            })?)
        }
    })?;
    Ok(())
}
