//! In-process transport: two directly connected pipe ends.
//!
//! Used by tests and by hosts that embed a server and client in one
//! process. One process end equals one session, so there is no session ID.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use galah_mcp_protocol::JsonRpcMessage;

use crate::transport::{Transport, TransportError, TransportEvent, TransportSendOptions};

const CHANNEL_CAPACITY: usize = 256;

/// One end of an in-process pipe. Create both ends with [`InProcessTransport::pair`].
pub struct InProcessTransport {
    to_remote: mpsc::Sender<TransportEvent>,
    to_local: mpsc::Sender<TransportEvent>,
    inbound: parking_lot::Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    closed: AtomicBool,
}

impl InProcessTransport {
    /// Two connected ends; whatever one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let left = Self {
            to_remote: b_tx.clone(),
            to_local: a_tx.clone(),
            inbound: parking_lot::Mutex::new(Some(a_rx)),
            closed: AtomicBool::new(false),
        };
        let right = Self {
            to_remote: a_tx,
            to_local: b_tx,
            inbound: parking_lot::Mutex::new(Some(b_rx)),
            closed: AtomicBool::new(false),
        };
        (left, right)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.inbound.lock().take().ok_or(TransportError::NotStarted)
    }

    async fn send(
        &self,
        message: JsonRpcMessage,
        _options: TransportSendOptions,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.to_remote
            .send(TransportEvent::Message(message))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("in-process transport closing");
        let _ = self.to_remote.send(TransportEvent::Closed).await;
        let _ = self.to_local.send(TransportEvent::Closed).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galah_mcp_protocol::JsonRpcNotification;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (left, right) = InProcessTransport::pair();
        let mut left_rx = left.start().await.unwrap();
        let mut right_rx = right.start().await.unwrap();

        left.send(
            JsonRpcNotification::new("notifications/initialized", None).into(),
            TransportSendOptions::default(),
        )
        .await
        .unwrap();
        match right_rx.recv().await.unwrap() {
            TransportEvent::Message(JsonRpcMessage::Notification(n)) => {
                assert_eq!(n.method, "notifications/initialized");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        right
            .send(
                JsonRpcNotification::new("notifications/progress", None).into(),
                TransportSendOptions::default(),
            )
            .await
            .unwrap();
        assert!(matches!(
            left_rx.recv().await.unwrap(),
            TransportEvent::Message(_)
        ));
    }

    #[tokio::test]
    async fn test_close_signals_both_ends() {
        let (left, right) = InProcessTransport::pair();
        let mut left_rx = left.start().await.unwrap();
        let mut right_rx = right.start().await.unwrap();

        left.close().await.unwrap();
        assert!(matches!(left_rx.recv().await.unwrap(), TransportEvent::Closed));
        assert!(matches!(right_rx.recv().await.unwrap(), TransportEvent::Closed));

        let err = left
            .send(
                JsonRpcNotification::new("notifications/progress", None).into(),
                TransportSendOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_start_is_single_use() {
        let (left, _right) = InProcessTransport::pair();
        left.start().await.unwrap();
        assert!(matches!(
            left.start().await.unwrap_err(),
            TransportError::NotStarted
        ));
    }
}
