//! The RPC Consumer (§4.4): one dispatch loop per service, shared by every
//! [`crate::entrypoint::RpcEntrypointProvider`] registered against it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use nexus_core::{ErrorCategory, Logger, NexusError, NoopLogger, RpcConfig, codes};
use nexus_hosting::{ContextData, ServiceContainer};
use tokio::sync::{Notify, OnceCell};

use crate::broker::{Broker, Delivery};
use crate::envelope::{RequestBody, decode_context_headers, error_envelope_from};
use crate::responder::Responder;
use crate::signal::OnceSignal;

fn noop_logger() -> &'static Arc<dyn Logger> {
    static LOGGER: std::sync::OnceLock<Arc<dyn Logger>> = std::sync::OnceLock::new();
    LOGGER.get_or_init(|| Arc::new(NoopLogger))
}

/// Invoked by the consumer's dispatch loop once a delivery's method has been matched against a
/// registered provider (§4.4).
#[async_trait]
pub trait EntrypointCallback: Send + Sync {
    async fn handle_message(
        self: Arc<Self>,
        delivery: Arc<Delivery>,
        context_data: ContextData,
        body: RequestBody,
    );
}

/// Shared by every [`crate::entrypoint::RpcEntrypointProvider`] of one service: declares the
/// service's request queue lazily on the first `prepare()`, runs a single dispatch loop for as
/// long as at least one provider is registered, and tears the queue down again once the last
/// one unregisters (§4.4).
pub struct RpcConsumer {
    broker: Arc<dyn Broker>,
    exchange: String,
    queue_name: String,
    service_name: Arc<str>,
    providers: DashMap<String, Arc<dyn EntrypointCallback>>,
    provider_count: AtomicUsize,
    started: OnceCell<()>,
    stop_notify: Notify,
    stopped: OnceSignal,
    logger: OnceCell<Arc<dyn Logger>>,
}

impl RpcConsumer {
    pub fn new(broker: Arc<dyn Broker>, config: &RpcConfig, service_name: impl Into<Arc<str>>) -> Arc<Self> {
        let service_name = service_name.into();
        Arc::new(Self {
            broker,
            exchange: config.rpc_exchange.clone(),
            queue_name: format!("rpc-{service_name}"),
            service_name,
            providers: DashMap::new(),
            provider_count: AtomicUsize::new(0),
            started: OnceCell::new(),
            stop_notify: Notify::new(),
            stopped: OnceSignal::new(),
            logger: OnceCell::new(),
        })
    }

    fn logger(&self) -> &Arc<dyn Logger> {
        self.logger.get().unwrap_or_else(noop_logger)
    }

    /// Declares the service's queue and spawns the dispatch loop exactly once, as a
    /// non-protected managed thread of `container` (§4.4, §4.3's `spawn_managed_thread`).
    pub async fn ensure_started(
        self: &Arc<Self>,
        container: &Arc<ServiceContainer>,
    ) -> Result<(), NexusError> {
        let _ = self.logger.set(Arc::clone(container.logger()));
        self.started
            .get_or_try_init(|| async {
                let routing_key = format!("{}.*", self.service_name);
                let rx = self
                    .broker
                    .declare_and_consume(&self.queue_name, &self.exchange, &routing_key, true)
                    .await?;

                self.logger().info(
                    "rpc consumer started",
                    &[
                        ("service", self.service_name.as_ref().into()),
                        ("exchange", self.exchange.as_str().into()),
                    ],
                );

                let this = Arc::clone(self);
                container.spawn_managed_thread(
                    async move { this.run_loop(rx).await },
                    false,
                );
                Ok(())
            })
            .await
            .map(|_| ())
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn register_provider(&self, method: impl Into<String>, provider: Arc<dyn EntrypointCallback>) {
        self.providers.insert(method.into(), provider);
        self.provider_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Unregisters `method`; if it was the last provider, blocks until the dispatch loop has
    /// actually stopped consuming (§4.4's corresponding `stop()`).
    pub async fn unregister_provider(&self, method: &str) {
        self.providers.remove(method);
        if self.provider_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.stop_notify.notify_waiters();
            self.stopped.wait().await;
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        mut rx: tokio::sync::mpsc::Receiver<Delivery>,
    ) -> Result<(), NexusError> {
        loop {
            tokio::select! {
                biased;
                _ = self.stop_notify.notified() => break,
                delivery = rx.recv() => {
                    match delivery {
                        Some(delivery) => self.dispatch(delivery).await,
                        None => break,
                    }
                }
            }
        }
        self.stopped.fire().await;
        Ok(())
    }

    async fn dispatch(&self, delivery: Delivery) {
        let method = delivery
            .routing_key
            .rsplit_once('.')
            .map(|(_, method)| method.to_string())
            .unwrap_or_else(|| delivery.routing_key.clone());

        let Some(provider) = self.providers.get(&method).map(|entry| Arc::clone(entry.value())) else {
            let err = NexusError::method_not_found(&self.service_name, &method);
            self.logger().warn(
                "no entrypoint for inbound delivery",
                &[("service", self.service_name.as_ref().into()), ("method", method.as_str().into())],
            );
            let responder = Responder::new(Arc::clone(&self.broker), self.exchange.clone(), &delivery);
            let _ = responder.send_response(None, Some(error_envelope_from(&err))).await;
            delivery.ack().await;
            return;
        };

        let body: RequestBody = match serde_json::from_slice(&delivery.body) {
            Ok(body) => body,
            Err(parse_err) => {
                let err = NexusError::with_source(
                    codes::USER_CODE_FAILED,
                    ErrorCategory::UserCode,
                    "request body was not valid JSON",
                    parse_err,
                );
                let responder = Responder::new(Arc::clone(&self.broker), self.exchange.clone(), &delivery);
                let _ = responder.send_response(None, Some(error_envelope_from(&err))).await;
                delivery.ack().await;
                return;
            }
        };

        let context_data = decode_context_headers(&delivery.headers);
        provider.handle_message(Arc::new(delivery), context_data, body).await;
    }
}
