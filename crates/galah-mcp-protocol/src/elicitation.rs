//! Elicitation (`elicitation/create`) payloads — server-initiated structured
//! user input, either as an inline form or by navigating the user to a URL.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::Meta;

pub const ELICITATION_MODE_FORM: &str = "form";
pub const ELICITATION_MODE_URL: &str = "url";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitCreateParams {
    /// Human-readable explanation of what is being asked and why
    pub message: String,
    /// JSON Schema the collected `content` must satisfy (form mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<Value>,
    /// "form" (default) or "url"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Destination for url mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Correlates `notifications/elicitation/complete` in url mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ElicitCreateParams {
    pub fn form(message: impl Into<String>, requested_schema: Value) -> Self {
        Self {
            message: message.into(),
            requested_schema: Some(requested_schema),
            mode: None,
            url: None,
            elicitation_id: None,
            meta: None,
        }
    }

    pub fn url(
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            requested_schema: None,
            mode: Some(ELICITATION_MODE_URL.to_string()),
            url: Some(url.into()),
            elicitation_id: Some(elicitation_id.into()),
            meta: None,
        }
    }
}

/// How the user resolved the elicitation. Decline and cancel are outcomes,
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    Accept,
    Decline,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitResult {
    pub action: ElicitAction,
    /// Collected values, present only on accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ElicitResult {
    pub fn accept(content: Value) -> Self {
        Self {
            action: ElicitAction::Accept,
            content: Some(content),
            meta: None,
        }
    }

    pub fn decline() -> Self {
        Self {
            action: ElicitAction::Decline,
            content: None,
            meta: None,
        }
    }
}

/// `notifications/elicitation/complete` params (url mode, advisory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitCompleteParams {
    pub elicitation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_values() {
        assert_eq!(serde_json::to_value(ElicitAction::Accept).unwrap(), json!("accept"));
        assert_eq!(serde_json::to_value(ElicitAction::Decline).unwrap(), json!("decline"));
        assert_eq!(serde_json::to_value(ElicitAction::Cancel).unwrap(), json!("cancel"));
    }

    #[test]
    fn test_url_mode_params() {
        let params = ElicitCreateParams::url("Sign in", "https://example.com/auth", "e-1");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["mode"], "url");
        assert_eq!(value["elicitationId"], "e-1");
        assert!(value.get("requestedSchema").is_none());
    }
}
