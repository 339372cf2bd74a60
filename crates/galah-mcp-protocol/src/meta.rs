//! `_meta` building blocks: progress tokens, pagination cursors, and
//! annotations shared by tools, resources, and content blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Token correlating progress notifications to the request that opted in.
/// Strings and integers are both legal on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::String(s) => write!(f, "{}", s),
            ProgressToken::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        ProgressToken::String(s.to_string())
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        ProgressToken::Number(n)
    }
}

/// Opaque pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Display annotations attached to content and resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    /// Intended audience: "user", "assistant", or both
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,
    /// Priority hint in `[0.0, 1.0]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// Insert a `progressToken` into a params value's `_meta` section, creating
/// the section if absent. Used by the peer when the caller registers a
/// progress handler.
pub fn attach_progress_token(params: &mut Value, token: &ProgressToken) {
    if !params.is_object() {
        *params = Value::Object(serde_json::Map::new());
    }
    let Some(obj) = params.as_object_mut() else {
        return;
    };
    let meta = obj
        .entry("_meta")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Some(meta_obj) = meta.as_object_mut() {
        meta_obj.insert(
            "progressToken".to_string(),
            serde_json::to_value(token).unwrap_or(Value::Null),
        );
    }
}

/// Insert `_meta.relatedTask = {taskId}` into a result object.
pub fn attach_related_task(result: &mut Value, task_id: &str) {
    if let Some(obj) = result.as_object_mut() {
        let meta = obj
            .entry("_meta")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(meta_obj) = meta.as_object_mut() {
            meta_obj.insert(
                "relatedTask".to_string(),
                serde_json::json!({ "taskId": task_id }),
            );
        }
    }
}

/// Free-form `_meta` map alias used by payload types.
pub type Meta = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_token_accepts_both_shapes() {
        let s: ProgressToken = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, ProgressToken::String("abc".into()));
        let n: ProgressToken = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(n, ProgressToken::Number(42));
    }

    #[test]
    fn test_attach_progress_token_creates_meta() {
        let mut params = json!({"name": "echo"});
        attach_progress_token(&mut params, &ProgressToken::Number(3));
        assert_eq!(params["_meta"]["progressToken"], 3);
        assert_eq!(params["name"], "echo");
    }

    #[test]
    fn test_attach_related_task() {
        let mut result = json!({"content": []});
        attach_related_task(&mut result, "task-1");
        assert_eq!(result["_meta"]["relatedTask"]["taskId"], "task-1");
    }
}
