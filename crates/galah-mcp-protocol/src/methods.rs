//! The closed set of MCP method and notification names.

pub const INITIALIZE: &str = "initialize";
pub const PING: &str = "ping";

pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";

pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";

pub const COMPLETION_COMPLETE: &str = "completion/complete";

pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
pub const ELICITATION_CREATE: &str = "elicitation/create";

pub const TASKS_LIST: &str = "tasks/list";
pub const TASKS_GET: &str = "tasks/get";
pub const TASKS_RESULT: &str = "tasks/result";
pub const TASKS_CANCEL: &str = "tasks/cancel";

pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

pub const NOTIF_INITIALIZED: &str = "notifications/initialized";
pub const NOTIF_CANCELLED: &str = "notifications/cancelled";
pub const NOTIF_PROGRESS: &str = "notifications/progress";
pub const NOTIF_MESSAGE: &str = "notifications/message";
pub const NOTIF_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const NOTIF_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const NOTIF_RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const NOTIF_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
pub const NOTIF_TASKS_STATUS: &str = "notifications/tasks/status";
pub const NOTIF_ELICITATION_COMPLETE: &str = "notifications/elicitation/complete";
