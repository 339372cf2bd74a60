//! Tool descriptors and the `tools/list` / `tools/call` payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::Content;
use crate::icons::Icon;
use crate::meta::{Cursor, Meta};
use crate::tasks::TaskMetadata;

/// Behavioral hints about a tool. Purely advisory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// How a tool relates to task-based execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    Forbidden,
    Optional,
    Required,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_support: Option<TaskSupport>,
}

/// A callable tool exposed by a server. Identified by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the `arguments` object
    pub input_schema: Value,
    /// JSON Schema the `structuredContent` of results must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Tool {
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
            execution: None,
            icon: None,
            meta: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_task_support(mut self, support: TaskSupport) -> Self {
        self.execution = Some(ToolExecution {
            task_support: Some(support),
        });
        self
    }

    /// Whether this tool refuses direct (non-task) invocation.
    pub fn requires_task(&self) -> bool {
        matches!(
            self.execution.as_ref().and_then(|e| e.task_support),
            Some(TaskSupport::Required)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// `tools/call` params. Presence of `task` turns the call into a
/// task-augmented request answered with `CreateTaskResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskMetadata>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl CallToolParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: None,
            task: None,
            meta: None,
        }
    }

    pub fn with_arguments(mut self, arguments: serde_json::Map<String, Value>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn with_task(mut self, task: TaskMetadata) -> Self {
        self.task = Some(task);
        self
    }
}

/// Result of a direct tool call.
///
/// `is_error: Some(true)` marks a tool-level failure; the JSON-RPC response
/// itself is still a success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            ..Default::default()
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            structured_content: Some(value),
            ..Default::default()
        }
    }

    /// Tool-level error result carrying the failure as text content.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: Some(true),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_wire_shape() {
        let tool = Tool::new("echo", json!({"type": "object"}))
            .with_description("Echo a message")
            .with_task_support(TaskSupport::Required);
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["inputSchema"]["type"], "object");
        assert_eq!(value["execution"]["taskSupport"], "required");
        assert!(tool.requires_task());
    }

    #[test]
    fn test_call_tool_result_error_helper() {
        let result = CallToolResult::error("boom");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content[0].as_text(), Some("boom"));
    }

    #[test]
    fn test_task_augmented_params_round_trip() {
        let params = CallToolParams::new("slow")
            .with_task(TaskMetadata { ttl: Some(60_000), poll_interval: Some(100) });
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["task"]["ttl"], 60_000);
        assert_eq!(value["task"]["pollInterval"], 100);
        let back: CallToolParams = serde_json::from_value(value).unwrap();
        assert_eq!(back.task.unwrap().poll_interval, Some(100));
    }

    #[test]
    fn test_result_content_defaults_empty() {
        let result: CallToolResult =
            serde_json::from_value(json!({"structuredContent": {"a": 1}})).unwrap();
        assert!(result.content.is_empty());
        assert_eq!(result.structured_content.unwrap()["a"], 1);
    }
}
