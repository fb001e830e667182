//! The Service Proxy / Method Proxy (§4.8): the injection a worker uses to call another
//! service over the same broker, bound once per worker via [`nexus_hosting::Injection::inject`].
//!
//! Per §5: "No built-in timeouts on RPC calls; callers must impose their own" — a caller that
//! wants a deadline wraps [`BoundServiceProxy::call`] in `tokio::time::timeout` itself and, on
//! expiry, should call [`ReplyListener::forget_reply_event`] to release the pending slot.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use nexus_core::{CorrelationId, ErrorCategory, NexusError, RemoteError, RpcConfig};
use nexus_hosting::{ContextData, Dependency, Injection, WorkerContext};
use serde_json::Value;

use crate::broker::{Broker, OutboundMessage, RetryPolicy};
use crate::envelope::{RequestBody, encode_context_headers};
use crate::reply_listener::ReplyListener;

/// Registered into a [`nexus_hosting::DependencySet`] as an injection, keyed under
/// [`Dependency::name`] (the attribute name a worker binds it under, per §4.3 step 1).
pub struct ServiceProxy {
    binding_name: Arc<str>,
    target_service: Arc<str>,
    broker: Arc<dyn Broker>,
    exchange: String,
    reply_listener: Arc<ReplyListener>,
}

impl ServiceProxy {
    pub fn new(
        binding_name: impl Into<Arc<str>>,
        target_service: impl Into<Arc<str>>,
        broker: Arc<dyn Broker>,
        config: &RpcConfig,
        reply_listener: Arc<ReplyListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            binding_name: binding_name.into(),
            target_service: target_service.into(),
            broker,
            exchange: config.rpc_exchange.clone(),
            reply_listener,
        })
    }
}

#[async_trait]
impl Dependency for ServiceProxy {
    fn name(&self) -> &str {
        &self.binding_name
    }
}

#[async_trait]
impl Injection for ServiceProxy {
    async fn inject(&self, ctx: &WorkerContext) -> Arc<dyn Any + Send + Sync> {
        Arc::new(BoundServiceProxy {
            target_service: Arc::clone(&self.target_service),
            broker: Arc::clone(&self.broker),
            exchange: self.exchange.clone(),
            reply_listener: Arc::clone(&self.reply_listener),
            context_data: ctx.context_data().clone(),
        })
    }
}

/// The value a worker actually sees once downcast out of [`nexus_hosting::Bindings`]: captures
/// the calling worker's `context_data` so that every outbound call propagates it onward (§6.2).
pub struct BoundServiceProxy {
    target_service: Arc<str>,
    broker: Arc<dyn Broker>,
    exchange: String,
    reply_listener: Arc<ReplyListener>,
    context_data: ContextData,
}

impl BoundServiceProxy {
    /// Publishes a request and waits for its correlated reply (§4.8). Does not impose a
    /// deadline of its own; wrap the returned future in `tokio::time::timeout` to add one.
    pub async fn call(&self, method: &str, args: Value, kwargs: Value) -> Result<Value, NexusError> {
        let correlation_id = CorrelationId::generate();
        let routing_key = format!("{}.{}", self.target_service, method);
        let reply_to = self.reply_listener.routing_key();
        let waiter = self.reply_listener.get_reply_event(correlation_id.as_str());

        let message = OutboundMessage {
            correlation_id: Some(correlation_id.to_string()),
            reply_to: Some(reply_to.to_string()),
            headers: encode_context_headers(&self.context_data),
            body: serde_json::to_vec(&RequestBody { args, kwargs })
                .expect("RequestBody always serializes"),
        };

        if let Err(err) = self
            .broker
            .publish(&self.exchange, &routing_key, message, RetryPolicy::default())
            .await
        {
            self.reply_listener.forget_reply_event(correlation_id.as_str());
            return Err(err);
        }

        let reply = waiter.await.map_err(|_| {
            NexusError::new(
                nexus_core::codes::REMOTE_ERROR,
                ErrorCategory::Remote,
                format!("reply listener dropped before a reply to {routing_key} arrived"),
            )
        })?;

        match (reply.result, reply.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(RemoteError::from(error).into()),
            _ => Err(NexusError::new(
                nexus_core::codes::REMOTE_ERROR,
                ErrorCategory::Remote,
                format!("malformed reply from {routing_key}: exactly one of result/error expected"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use nexus_core::{ContainerConfig, RpcConfig};
    use nexus_hosting::{Bindings, ContainerBuilder, DependencySet, Service, ServiceFactory};

    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::consumer::RpcConsumer;
    use crate::entrypoint::RpcEntrypointProvider;

    struct EchoService;
    #[async_trait]
    impl Service for EchoService {
        async fn call(&self, ctx: &WorkerContext, bindings: &Bindings) -> Result<Value, NexusError> {
            if let Some(proxy) = bindings.get::<BoundServiceProxy>("greeter_rpc") {
                return proxy.call("hello", ctx.args().clone(), Value::Null).await;
            }
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
    async fn a_worker_can_call_another_service_through_its_bound_proxy() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());

        let rpc_config = RpcConfig::default();

        // The "greeter" service: one entrypoint exposing `hello`.
        let greeter_consumer = RpcConsumer::new(Arc::clone(&broker), &rpc_config, "greeter");
        let greeter_provider = RpcEntrypointProvider::new("hello", Arc::clone(&greeter_consumer));
        let mut greeter_deps = DependencySet::new();
        greeter_deps.add_entrypoint(greeter_provider);
        let greeter_container = ContainerBuilder::new("greeter", Arc::new(EchoFactory))
            .with_dependencies(greeter_deps)
            .build();
        greeter_container.start().await.unwrap();

        // The "gateway" service: one entrypoint that, via its proxy, calls into "greeter".
        let gateway_consumer = RpcConsumer::new(Arc::clone(&broker), &rpc_config, "gateway");
        let gateway_provider = RpcEntrypointProvider::new("forward", Arc::clone(&gateway_consumer));
        let reply_listener = ReplyListener::new(Arc::clone(&broker), "gateway", &rpc_config);
        let proxy = ServiceProxy::new(
            "greeter_rpc",
            "greeter",
            Arc::clone(&broker),
            &rpc_config,
            Arc::clone(&reply_listener),
        );

        let mut gateway_deps = DependencySet::new();
        gateway_deps.add_entrypoint(gateway_provider);
        gateway_deps.add_injection(proxy);
        gateway_deps.add_nested(Arc::clone(&reply_listener) as Arc<dyn Dependency>);

        let gateway_container = ContainerBuilder::new("gateway", Arc::new(EchoFactory))
            .with_config(ContainerConfig { max_workers: 4, parent_calls_tracked: 10 })
            .with_dependencies(gateway_deps)
            .build();
        gateway_container.start().await.unwrap();

        let mut replies = broker
            .declare_and_consume("client-reply", "nameko-rpc", "client-reply-key", false)
            .await
            .unwrap();

        broker
            .publish(
                "nameko-rpc",
                "gateway.forward",
                OutboundMessage {
                    correlation_id: Some("outer-corr".to_string()),
                    reply_to: Some("client-reply-key".to_string()),
                    headers: Default::default(),
                    body: serde_json::to_vec(&RequestBody {
                        args: Value::from("hi there"),
                        kwargs: Value::Null,
                    })
                    .unwrap(),
                },
                RetryPolicy::default(),
            )
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let body: crate::envelope::ReplyBody = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body.result, Some(Value::from("hi there")));

        gateway_container.stop().await.unwrap();
        greeter_container.stop().await.unwrap();
    }
}
