//! Capability gating.
//!
//! Sending a method requires that the peer advertised the enabling
//! capability during initialization. Violations fail locally and
//! synchronously; nothing reaches the wire. Methods outside the known
//! table pass through for forward compatibility.

use galah_mcp_protocol::methods;
use galah_mcp_protocol::{ClientCapabilities, McpError, McpResult, ServerCapabilities};

fn missing(method: &str, capability: &str) -> McpError {
    McpError::InvalidRequest(format!(
        "cannot send {}: peer did not advertise the {} capability",
        method, capability
    ))
}

/// Gate for methods a client sends to a server.
pub fn assert_server_capability(
    capabilities: &ServerCapabilities,
    method: &str,
) -> McpResult<()> {
    match method {
        methods::INITIALIZE | methods::PING => Ok(()),
        methods::RESOURCES_SUBSCRIBE | methods::RESOURCES_UNSUBSCRIBE => {
            let supported = capabilities
                .resources
                .as_ref()
                .is_some_and(|r| r.subscribe == Some(true));
            supported
                .then_some(())
                .ok_or_else(|| missing(method, "resources.subscribe"))
        }
        m if m.starts_with("tools/") => capabilities
            .tools
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "tools")),
        m if m.starts_with("resources/") => capabilities
            .resources
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "resources")),
        m if m.starts_with("prompts/") => capabilities
            .prompts
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "prompts")),
        methods::COMPLETION_COMPLETE => capabilities
            .completions
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "completions")),
        m if m.starts_with("tasks/") => capabilities
            .tasks
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "tasks")),
        methods::LOGGING_SET_LEVEL => capabilities
            .logging
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "logging")),
        _ => Ok(()),
    }
}

/// Gate for methods a server sends to a client.
pub fn assert_client_capability(
    capabilities: &ClientCapabilities,
    method: &str,
) -> McpResult<()> {
    match method {
        methods::PING => Ok(()),
        methods::SAMPLING_CREATE_MESSAGE => capabilities
            .sampling
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "sampling")),
        methods::ELICITATION_CREATE => capabilities
            .elicitation
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "elicitation")),
        m if m.starts_with("roots/") => capabilities
            .roots
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "roots")),
        m if m.starts_with("tasks/") => capabilities
            .tasks
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| missing(method, "tasks")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galah_mcp_protocol::initialize::{
        ElicitationCapability, ResourcesCapability, ToolsCapability,
    };

    #[test]
    fn test_tools_methods_require_tools_capability() {
        let none = ServerCapabilities::default();
        assert!(assert_server_capability(&none, methods::TOOLS_CALL).is_err());

        let caps = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        };
        assert!(assert_server_capability(&caps, methods::TOOLS_CALL).is_ok());
        assert!(assert_server_capability(&caps, methods::TOOLS_LIST).is_ok());
    }

    #[test]
    fn test_subscribe_needs_the_subscribe_flag() {
        let without_flag = ServerCapabilities {
            resources: Some(ResourcesCapability::default()),
            ..Default::default()
        };
        assert!(assert_server_capability(&without_flag, methods::RESOURCES_READ).is_ok());
        assert!(assert_server_capability(&without_flag, methods::RESOURCES_SUBSCRIBE).is_err());

        let with_flag = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(assert_server_capability(&with_flag, methods::RESOURCES_SUBSCRIBE).is_ok());
    }

    #[test]
    fn test_elicitation_requires_client_capability() {
        let none = ClientCapabilities::default();
        assert!(assert_client_capability(&none, methods::ELICITATION_CREATE).is_err());

        let caps = ClientCapabilities {
            elicitation: Some(ElicitationCapability::default()),
            ..Default::default()
        };
        assert!(assert_client_capability(&caps, methods::ELICITATION_CREATE).is_ok());
    }

    #[test]
    fn test_ping_and_unknown_methods_pass() {
        let none = ServerCapabilities::default();
        assert!(assert_server_capability(&none, methods::PING).is_ok());
        assert!(assert_server_capability(&none, "vendor/custom").is_ok());
    }
}
