//! The Responder (§4.5): publishes exactly one reply per inbound delivery, then leaves
//! acknowledgement to the caller so that a publish failure never causes a message to be lost
//! (ack happens strictly after the reply has been handed to the broker).

use std::sync::Arc;

use nexus_core::NexusError;
use serde_json::Value;

use crate::broker::{Broker, Delivery, OutboundMessage, RetryPolicy};
use crate::envelope::{ErrorEnvelope, ReplyBody};

/// Bound to one [`Delivery`]'s `reply_to`/`correlation_id` for the lifetime of a single
/// request/reply exchange.
pub struct Responder {
    broker: Arc<dyn Broker>,
    exchange: String,
    reply_to: Option<String>,
    correlation_id: Option<String>,
}

impl Responder {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>, delivery: &Delivery) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            reply_to: delivery.reply_to.clone(),
            correlation_id: delivery.correlation_id.clone(),
        }
    }

    /// Sends exactly one of `result`/`error` back to the caller's reply queue. A delivery with
    /// no `reply_to` (a fire-and-forget call) is a no-op (§4.5).
    pub async fn send_response(
        &self,
        result: Option<Value>,
        error: Option<ErrorEnvelope>,
    ) -> Result<(), NexusError> {
        let Some(reply_to) = self.reply_to.as_ref() else {
            return Ok(());
        };

        let body = ReplyBody { result, error };
        let message = OutboundMessage {
            correlation_id: self.correlation_id.clone(),
            reply_to: None,
            headers: Default::default(),
            body: serde_json::to_vec(&body).expect("ReplyBody always serializes"),
        };

        self.broker
            .publish(&self.exchange, reply_to, message, RetryPolicy::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    #[tokio::test]
    async fn send_response_publishes_under_the_reply_to_routing_key() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let mut replies = broker
            .declare_and_consume("reply-q", "ex", "reply-abc", false)
            .await
            .unwrap();

        let (delivery, _ack_rx) = Delivery::new(
            "svc.method",
            Some("corr-1".to_string()),
            Some("reply-abc".to_string()),
            Default::default(),
            Vec::new(),
        );
        let responder = Responder::new(Arc::clone(&broker), "ex", &delivery);
        responder
            .send_response(Some(Value::from(7)), None)
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let body: ReplyBody = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body.result, Some(Value::from(7)));
        assert_eq!(reply.correlation_id.as_deref(), Some("corr-1"));
    }

    #[tokio::test]
    async fn fire_and_forget_delivery_sends_nothing() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let (delivery, _ack_rx) =
            Delivery::new("svc.method", None, None, Default::default(), Vec::new());
        let responder = Responder::new(Arc::clone(&broker), "ex", &delivery);
        responder.send_response(Some(Value::Null), None).await.unwrap();
    }
}
