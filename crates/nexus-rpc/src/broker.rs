//! The Broker port (§4.9): the narrow publish/declare-and-consume/ack abstraction the rest of
//! this crate is built against. The concrete AMQP (or other) transport is an external
//! collaborator per the top-level Non-goals; this module defines only the trait boundary and
//! an in-process reference implementation used by this crate's own tests.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use nexus_core::{ErrorCategory, NexusError, codes};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};

/// One inbound message handed to a consumer, carrying everything a responder or a reply
/// listener needs plus an acknowledgement handle (§4.4, §4.7).
pub struct Delivery {
    pub routing_key: String,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    ack: AsyncMutex<Option<oneshot::Sender<()>>>,
}

impl Delivery {
    pub fn new(
        routing_key: impl Into<String>,
        correlation_id: Option<String>,
        reply_to: Option<String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                routing_key: routing_key.into(),
                correlation_id,
                reply_to,
                headers,
                body,
                ack: AsyncMutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Acknowledges the message. Idempotent: a second call is a no-op.
    pub async fn ack(&self) {
        if let Some(tx) = self.ack.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

/// A message about to be published (§6.1).
#[derive(Clone, Debug, Default)]
pub struct OutboundMessage {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Bounded retry policy for a publish (§4.6, §5: "the responder's publish uses a bounded
/// retry policy").
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// The transport-agnostic seam the RPC subsystem is written against (§4.9).
///
/// Grounded in the workspace's broader pattern of defining a narrow trait at a transport
/// boundary (a `Channel`/pipeline abstraction) and leaving the concrete implementation to a
/// separate crate. A real implementation wraps an AMQP (or other broker) client; this crate
/// ships only [`InMemoryBroker`], which exists for tests.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently declares `queue` bound to `exchange` with `routing_key`, and returns the
    /// stream of messages delivered to it (§6.3).
    async fn declare_and_consume(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        durable: bool,
    ) -> Result<mpsc::Receiver<Delivery>, NexusError>;

    /// Publishes one message to `exchange`, routed by `routing_key`, honoring `retry`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        retry: RetryPolicy,
    ) -> Result<(), NexusError>;
}

/// An in-process reference [`Broker`] implementing AMQP-style topic routing (`*` matches
/// exactly one dot-separated segment) with bounded channels standing in for queues. Used by
/// this crate's own tests and by any host that wants single-process request/reply without a
/// real broker.
#[derive(Default)]
pub struct InMemoryBroker {
    exchanges: DashMap<String, Vec<Binding>>,
}

struct Binding {
    pattern: Vec<String>,
    sender: mpsc::Sender<Delivery>,
}

fn topic_matches(pattern: &[String], key: &[&str]) -> bool {
    pattern.len() == key.len()
        && pattern
            .iter()
            .zip(key.iter())
            .all(|(segment, part)| segment == "*" || segment == part)
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_and_consume(
        &self,
        _queue: &str,
        exchange: &str,
        routing_key: &str,
        _durable: bool,
    ) -> Result<mpsc::Receiver<Delivery>, NexusError> {
        let (tx, rx) = mpsc::channel(128);
        self.exchanges.entry(exchange.to_string()).or_default().push(Binding {
            pattern: routing_key.split('.').map(str::to_string).collect(),
            sender: tx,
        });
        Ok(rx)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        retry: RetryPolicy,
    ) -> Result<(), NexusError> {
        let key_parts: Vec<&str> = routing_key.split('.').collect();
        let Some(bindings) = self.exchanges.get(exchange) else {
            return Ok(());
        };

        for binding in bindings.iter().filter(|b| topic_matches(&b.pattern, &key_parts)) {
            let (delivery, _ack_rx) = Delivery::new(
                routing_key.to_string(),
                message.correlation_id.clone(),
                message.reply_to.clone(),
                message.headers.clone(),
                message.body.clone(),
            );

            let mut attempt = 0;
            let mut pending = delivery;
            loop {
                match binding.sender.try_send(pending) {
                    Ok(()) => break,
                    Err(mpsc::error::TrySendError::Full(returned)) => {
                        attempt += 1;
                        if attempt > retry.max_retries {
                            return Err(NexusError::new(
                                codes::LIFECYCLE_HOOK_FAILED,
                                ErrorCategory::Lifecycle,
                                format!("publish to {exchange}/{routing_key} exhausted retries"),
                            ));
                        }
                        pending = returned;
                        tokio::task::yield_now().await;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(NexusError::new(
                            codes::LIFECYCLE_HOOK_FAILED,
                            ErrorCategory::Lifecycle,
                            format!("queue bound to {exchange}/{routing_key} is closed"),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topic_wildcard_matches_single_segment() {
        let broker = InMemoryBroker::new();
        let mut rx = broker
            .declare_and_consume("rpc-svc", "ex", "svc.*", true)
            .await
            .unwrap();

        broker
            .publish("ex", "svc.method", OutboundMessage::default(), RetryPolicy::default())
            .await
            .unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "svc.method");
    }

    #[tokio::test]
    async fn unmatched_routing_key_is_not_delivered() {
        let broker = InMemoryBroker::new();
        let mut rx = broker
            .declare_and_consume("rpc-svc", "ex", "svc.*", true)
            .await
            .unwrap();

        broker
            .publish("ex", "other.method", OutboundMessage::default(), RetryPolicy::default())
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_millis(20), rx.recv())
            .await
            .expect_err("no message should have matched the binding");
    }
}
