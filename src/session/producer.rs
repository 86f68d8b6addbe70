//! Producer Session: single outbound publish client for test traffic.

use std::sync::Arc;
use bytes::Bytes;

use crate::errors::ConsoleError;
use crate::session::types::MessageRecord;
use crate::transport::ProducerTransport;
use crate::utils::utils_time::now_label;

#[derive(Clone)]
pub struct ProducerSession {
    transport: Arc<dyn ProducerTransport>,
}

impl ProducerSession {
    pub(crate) fn new(transport: Arc<dyn ProducerTransport>) -> Self {
        Self { transport }
    }

    /// Single synchronous publish. The returned record carries the
    /// queryable id: the broker's offset id when supplied, the local id
    /// otherwise. No retry here; the caller decides.
    pub async fn send(&self, topic: &str, tag: &str, body: &str) -> Result<MessageRecord, ConsoleError> {
        let payload = Bytes::from(body.to_owned());
        let receipt = self
            .transport
            .send(topic, tag, payload.clone())
            .await
            .map_err(|e| ConsoleError::Send { topic: topic.to_string(), reason: e.to_string() })?;

        let id = receipt
            .offset_msg_id
            .filter(|s| !s.is_empty())
            .unwrap_or(receipt.msg_id);

        Ok(MessageRecord {
            id,
            topic: topic.to_string(),
            tag: tag.to_string(),
            time: now_label(),
            body: payload,
        })
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ConsoleError> {
        self.transport.shutdown().await
    }
}
