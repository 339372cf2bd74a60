//! Universal notification payloads handled inside the protocol core.

use serde::{Deserialize, Serialize};

use crate::json_rpc::RequestId;
use crate::meta::ProgressToken;

/// `notifications/cancelled` params. Asks the receiver to abandon work on a
/// previously issued request; ignored if the request already completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `notifications/progress` params, correlated by the `progressToken` the
/// original request carried in `_meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    /// Monotonically increasing progress value
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancelled_round_trip() {
        let params: CancelledParams =
            serde_json::from_value(json!({"requestId": 4, "reason": "user aborted"})).unwrap();
        assert_eq!(params.request_id, RequestId::Number(4));
        assert_eq!(params.reason.as_deref(), Some("user aborted"));
    }

    #[test]
    fn test_progress_token_shapes() {
        let params: ProgressParams =
            serde_json::from_value(json!({"progressToken": 7, "progress": 0.5, "total": 1.0}))
                .unwrap();
        assert_eq!(params.progress_token, ProgressToken::Number(7));
    }
}
