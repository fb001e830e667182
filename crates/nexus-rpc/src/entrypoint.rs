//! The RPC Entrypoint Provider (§4.4): the [`Dependency`] a service registers per exposed
//! method, bridging inbound deliveries to [`ServiceContainer::spawn_worker`].

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use nexus_core::NexusError;
use nexus_hosting::{Dependency, Entrypoint, Headers, ServiceContainer, WorkerContext, WorkerOutcome, WorkerResultHandler};

use crate::broker::{Broker, Delivery};
use crate::consumer::{EntrypointCallback, RpcConsumer};
use crate::envelope::{RequestBody, error_envelope_from};
use crate::responder::Responder;

/// One exposed method. Several providers typically share a single [`RpcConsumer`] (one per
/// service), since the consumer owns the dispatch loop and the providers own only their own
/// method name and worker-spawning.
pub struct RpcEntrypointProvider {
    method_name: Arc<str>,
    consumer: Arc<RpcConsumer>,
    container: OnceLock<Weak<ServiceContainer>>,
    self_ref: Weak<RpcEntrypointProvider>,
}

impl RpcEntrypointProvider {
    pub fn new(method_name: impl Into<Arc<str>>, consumer: Arc<RpcConsumer>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            method_name: method_name.into(),
            consumer,
            container: OnceLock::new(),
            self_ref: weak.clone(),
        })
    }

    fn container(&self) -> Arc<ServiceContainer> {
        self.container
            .get()
            .and_then(Weak::upgrade)
            .expect("bind_container always runs before any lifecycle hook (§4.3 `build`)")
    }
}

#[async_trait]
impl Dependency for RpcEntrypointProvider {
    fn name(&self) -> &str {
        &self.method_name
    }

    fn bind_container(&self, container: Weak<ServiceContainer>) {
        let _ = self.container.set(container);
    }

    async fn prepare(&self) -> Result<(), NexusError> {
        self.consumer.ensure_started(&self.container()).await
    }

    async fn start(&self) -> Result<(), NexusError> {
        let callback = self
            .self_ref
            .upgrade()
            .expect("provider is alive for the duration of its own start()");
        self.consumer
            .register_provider(self.method_name.as_ref(), callback as Arc<dyn EntrypointCallback>);
        Ok(())
    }

    async fn stop(&self) -> Result<(), NexusError> {
        self.consumer.unregister_provider(&self.method_name).await;
        Ok(())
    }
}

impl Entrypoint for RpcEntrypointProvider {}

#[async_trait]
impl EntrypointCallback for RpcEntrypointProvider {
    async fn handle_message(
        self: Arc<Self>,
        delivery: Arc<Delivery>,
        context_data: nexus_hosting::ContextData,
        body: RequestBody,
    ) {
        let container = self.container();
        let provider: Arc<dyn Entrypoint> = Arc::clone(&self) as Arc<dyn Entrypoint>;
        let headers: Headers = context_data;
        let handler = Arc::new(ResultForwarder {
            delivery,
            broker: Arc::clone(self.consumer.broker()),
            exchange: self.consumer.exchange().to_string(),
        });

        container
            .spawn_worker(provider, body.args, body.kwargs, Some(headers), Some(handler))
            .await;
    }
}

/// The `handle_result` callback bound at `spawn_worker` time (§4.3 step 7): turns a worker's
/// outcome into a reply and acks the originating delivery only once the reply has been handed
/// to the broker.
struct ResultForwarder {
    delivery: Arc<Delivery>,
    broker: Arc<dyn Broker>,
    exchange: String,
}

#[async_trait]
impl WorkerResultHandler for ResultForwarder {
    async fn handle_result(&self, _ctx: &WorkerContext, outcome: &WorkerOutcome) {
        let responder = Responder::new(Arc::clone(&self.broker), self.exchange.clone(), &self.delivery);
        let (result, error) = match outcome {
            WorkerOutcome::Success(value) => (Some(value.clone()), None),
            WorkerOutcome::Failure(err) => (None, Some(error_envelope_from(err))),
        };
        let _ = responder.send_response(result, error).await;
        self.delivery.ack().await;
    }
}

#[cfg(test)]
mod tests {
    use nexus_core::{ContainerConfig, RpcConfig};
    use nexus_hosting::{Bindings, ContainerBuilder, DependencySet, Service, ServiceFactory};
    use serde_json::Value;

    use super::*;
    use crate::broker::{InMemoryBroker, OutboundMessage, RetryPolicy};

    struct EchoService;

    #[async_trait]
    impl Service for EchoService {
        async fn call(&self, ctx: &WorkerContext, _bindings: &Bindings) -> Result<Value, NexusError> {
            Ok(ctx.args().clone())
        }
    }

    struct EchoFactory;
    impl ServiceFactory for EchoFactory {
        fn create(&self) -> Arc<dyn Service> {
            Arc::new(EchoService)
        }
    }

    #[tokio::test]
    async fn an_inbound_call_is_echoed_back_through_the_reply_queue() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let consumer = RpcConsumer::new(Arc::clone(&broker), &RpcConfig::default(), "greeter");
        let provider = RpcEntrypointProvider::new("hello", Arc::clone(&consumer));

        let mut deps = DependencySet::new();
        deps.add_entrypoint(provider);

        let container = ContainerBuilder::new("greeter", Arc::new(EchoFactory))
            .with_config(ContainerConfig { max_workers: 4, parent_calls_tracked: 10 })
            .with_dependencies(deps)
            .build();
        container.start().await.unwrap();

        let mut replies = broker
            .declare_and_consume("reply-q", "nameko-rpc", "reply-xyz", false)
            .await
            .unwrap();

        let request = RequestBody { args: Value::from("hi"), kwargs: Value::Null };
        broker
            .publish(
                "nameko-rpc",
                "greeter.hello",
                OutboundMessage {
                    correlation_id: Some("corr-1".to_string()),
                    reply_to: Some("reply-xyz".to_string()),
                    headers: Default::default(),
                    body: serde_json::to_vec(&request).unwrap(),
                },
                RetryPolicy::default(),
            )
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let body: crate::envelope::ReplyBody = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body.result, Some(Value::from("hi")));

        container.stop().await.unwrap();
    }

    #[tokio::test]
    async fn an_unregistered_method_replies_with_method_not_found() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let consumer = RpcConsumer::new(Arc::clone(&broker), &RpcConfig::default(), "greeter");
        let provider = RpcEntrypointProvider::new("hello", Arc::clone(&consumer));

        let mut deps = DependencySet::new();
        deps.add_entrypoint(provider);

        let container = ContainerBuilder::new("greeter", Arc::new(EchoFactory))
            .with_dependencies(deps)
            .build();
        container.start().await.unwrap();

        let mut replies = broker
            .declare_and_consume("reply-q", "nameko-rpc", "reply-abc", false)
            .await
            .unwrap();

        broker
            .publish(
                "nameko-rpc",
                "greeter.missing",
                OutboundMessage {
                    correlation_id: None,
                    reply_to: Some("reply-abc".to_string()),
                    headers: Default::default(),
                    body: serde_json::to_vec(&RequestBody { args: Value::Null, kwargs: Value::Null }).unwrap(),
                },
                RetryPolicy::default(),
            )
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let body: crate::envelope::ReplyBody = serde_json::from_slice(&reply.body).unwrap();
        let error = body.error.expect("missing method must reply with an error envelope");
        assert!(error.exc_type.contains("method_not_found"));

        container.stop().await.unwrap();
    }
}
