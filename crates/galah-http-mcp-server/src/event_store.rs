//! Event persistence for SSE replay.
//!
//! The store is the only source of truth for cross-reconnect ordering: a
//! reconnect without one simply resumes from now. Event IDs embed their
//! stream (`{stream_id}_{counter}`) so a bare `Last-Event-ID` identifies
//! both the stream and the position.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use galah_mcp_protocol::{JsonRpcMessage, McpError, McpResult};

/// One replayable event.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event_id: String,
    pub message: JsonRpcMessage,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a message on a stream, returning its assigned event ID.
    /// IDs are strictly increasing within a stream; streams are not
    /// comparable to each other.
    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> McpResult<String>;

    /// All events of the identified stream strictly after `last_event_id`,
    /// in send order.
    async fn replay_events_after(
        &self,
        last_event_id: &str,
    ) -> McpResult<(String, Vec<StoredEvent>)>;
}

/// Split `{stream_id}_{counter}` back into its parts.
fn parse_event_id(event_id: &str) -> McpResult<(&str, u64)> {
    let (stream_id, counter) = event_id
        .rsplit_once('_')
        .ok_or_else(|| McpError::InvalidParams(format!("malformed event id: {}", event_id)))?;
    let counter = counter
        .parse::<u64>()
        .map_err(|_| McpError::InvalidParams(format!("malformed event id: {}", event_id)))?;
    Ok((stream_id, counter))
}

/// Volatile store, suitable for single-process servers.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: parking_lot::Mutex<HashMap<String, Vec<(u64, JsonRpcMessage)>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> McpResult<String> {
        let mut streams = self.streams.lock();
        let stream = streams.entry(stream_id.to_string()).or_default();
        let counter = stream.last().map(|(n, _)| n + 1).unwrap_or(1);
        stream.push((counter, message.clone()));
        Ok(format!("{}_{}", stream_id, counter))
    }

    async fn replay_events_after(
        &self,
        last_event_id: &str,
    ) -> McpResult<(String, Vec<StoredEvent>)> {
        let (stream_id, after) = parse_event_id(last_event_id)?;
        let streams = self.streams.lock();
        let events = streams
            .get(stream_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|(counter, _)| *counter > after)
                    .map(|(counter, message)| StoredEvent {
                        event_id: format!("{}_{}", stream_id, counter),
                        message: message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        debug!(stream_id, after, "replaying events");
        Ok((stream_id.to_string(), events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galah_mcp_protocol::JsonRpcNotification;
    use serde_json::json;

    fn message(n: u64) -> JsonRpcMessage {
        JsonRpcNotification::new("notifications/message", Some(json!({"n": n}))).into()
    }

    #[tokio::test]
    async fn test_ids_monotonic_within_stream() {
        let store = InMemoryEventStore::new();
        let a = store.store_event("s1", &message(1)).await.unwrap();
        let b = store.store_event("s1", &message(2)).await.unwrap();
        let c = store.store_event("s2", &message(3)).await.unwrap();
        assert_eq!(a, "s1_1");
        assert_eq!(b, "s1_2");
        assert_eq!(c, "s2_1");
    }

    #[tokio::test]
    async fn test_replay_is_strictly_after_without_gaps() {
        let store = InMemoryEventStore::new();
        for n in 1..=5 {
            store.store_event("s", &message(n)).await.unwrap();
        }
        let (stream_id, events) = store.replay_events_after("s_2").await.unwrap();
        assert_eq!(stream_id, "s");
        let ids: Vec<_> = events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["s_3", "s_4", "s_5"]);
    }

    #[tokio::test]
    async fn test_replay_from_latest_is_empty() {
        let store = InMemoryEventStore::new();
        store.store_event("s", &message(1)).await.unwrap();
        let (_, events) = store.replay_events_after("s_1").await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_id_rejected() {
        let store = InMemoryEventStore::new();
        assert!(store.replay_events_after("nonsense").await.is_err());
        assert!(store.replay_events_after("s_notanumber").await.is_err());
    }
}
